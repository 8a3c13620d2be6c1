//! Tests for tick ordering, yielding, timers and cancellation

use super::helpers::Harness;
use crate::engine::ThreadStatus;

#[test]
fn test_loop_with_yielding_body() {
    // A; repeat 2 { B (yields once) }; C
    let source = r#"{
        "blocks": [
            { "id": "A", "opcode": "test_log", "topLevel": true, "next": "loop",
              "inputs": { "MESSAGE": { "value": "A" } } },
            { "id": "loop", "opcode": "control_repeat", "next": "C",
              "inputs": { "TIMES": { "value": 2 }, "SUBSTACK": { "block": "B" } } },
            { "id": "B", "opcode": "test_yield_once",
              "inputs": { "MESSAGE": { "value": "B" } } },
            { "id": "C", "opcode": "test_log",
              "inputs": { "MESSAGE": { "value": "C" } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    assert!(h.scheduler.start_thread("A").is_some());

    // Tick 1: A ran and was replaced by its sibling; B yielded inside the loop
    h.tick();
    assert_eq!(h.stack("A"), vec!["loop", "B"]);
    assert_eq!(h.status("A"), Some(ThreadStatus::Yielded));
    assert_eq!(h.take_log(), vec!["A", "B yield"]);

    // Tick 2: B completes, the loop frame yields for the next iteration
    h.tick();
    assert_eq!(h.stack("A"), vec!["loop"]);
    assert_eq!(h.take_log(), vec!["B resume"]);

    // Ticks 3 and 4: second iteration with a fresh frame for B
    h.tick();
    assert_eq!(h.stack("A"), vec!["loop", "B"]);
    h.tick();
    assert_eq!(h.take_log(), vec!["B yield", "B resume"]);

    // Tick 5: loop is exhausted, C runs and the thread finishes
    let summary = h.tick();
    assert_eq!(h.take_log(), vec!["C"]);
    assert_eq!(summary.finished, 1);
    assert!(h.scheduler.thread_for("A").is_none());
    assert!(h.scheduler.is_idle());
}

#[test]
fn test_yielded_threads_resume_in_creation_order() {
    // X yields inside an if (deeper stack), Y yields at the top level
    let source = r#"{
        "blocks": [
            { "id": "X", "opcode": "test_log", "topLevel": true, "next": "if",
              "inputs": { "MESSAGE": { "value": "X1" } } },
            { "id": "if", "opcode": "control_if", "next": "X2",
              "inputs": { "CONDITION": { "value": true }, "SUBSTACK": { "block": "Xy" } } },
            { "id": "Xy", "opcode": "test_yield_once",
              "inputs": { "MESSAGE": { "value": "X" } } },
            { "id": "X2", "opcode": "test_log",
              "inputs": { "MESSAGE": { "value": "X2" } } },

            { "id": "Y", "opcode": "test_log", "topLevel": true, "next": "Yy",
              "inputs": { "MESSAGE": { "value": "Y1" } } },
            { "id": "Yy", "opcode": "test_yield_once", "next": "Y2",
              "inputs": { "MESSAGE": { "value": "Y" } } },
            { "id": "Y2", "opcode": "test_log",
              "inputs": { "MESSAGE": { "value": "Y2" } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("X");
    h.scheduler.start_thread("Y");

    let summary = h.tick();
    assert_eq!(summary.stepped, 2);
    assert_eq!(h.take_log(), vec!["X1", "X yield", "Y1", "Y yield"]);
    assert_eq!(h.stack("X").len(), 2);
    assert_eq!(h.stack("Y").len(), 1);
    assert_eq!(h.status("X"), Some(ThreadStatus::Yielded));
    assert_eq!(h.status("Y"), Some(ThreadStatus::Yielded));

    let summary = h.tick();
    assert_eq!(summary.stepped, 2);
    assert_eq!(h.take_log(), vec!["X resume", "X2", "Y resume", "Y2"]);
    assert!(h.scheduler.is_idle());
}

#[test]
fn test_wait_resumes_only_after_timer_is_due() {
    let source = r#"{
        "blocks": [
            { "id": "w", "opcode": "control_wait", "topLevel": true, "next": "after",
              "inputs": { "DURATION": { "value": 0.05 } } },
            { "id": "after", "opcode": "test_log",
              "inputs": { "MESSAGE": { "value": "after" } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("w");

    h.tick();
    assert_eq!(h.status("w"), Some(ThreadStatus::Yielded));
    assert_eq!(h.scheduler.timers().len(), 1);

    // Not due yet: the thread is not stepped
    h.clock.advance_ms(10);
    let summary = h.tick();
    assert_eq!(summary.stepped, 0);
    assert!(h.logged().is_empty());

    h.clock.advance_ms(50);
    let summary = h.tick();
    assert_eq!(summary.stepped, 1);
    assert_eq!(h.logged(), vec!["after"]);
    assert!(h.scheduler.is_idle());
    assert!(h.scheduler.timers().is_empty());
}

#[test]
fn test_stopped_thread_never_fires_its_timers() {
    let source = r#"{
        "blocks": [
            { "id": "t", "opcode": "test_timer", "topLevel": true,
              "inputs": { "DELAY": { "value": 10 } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("t");
    h.tick();
    assert_eq!(h.scheduler.timers().len(), 1);

    // Already past due when cancelled
    h.clock.advance_ms(50);
    assert!(h.scheduler.stop_thread("t"));
    h.tick();

    assert!(h.logged().is_empty());
    assert!(h.scheduler.timers().is_empty());
    assert!(!h.scheduler.stop_thread("t"));
}

#[test]
fn test_stop_all_cancels_every_timer() {
    let source = r#"{
        "blocks": [
            { "id": "t1", "opcode": "test_timer", "topLevel": true,
              "inputs": { "DELAY": { "value": 10 } } },
            { "id": "t2", "opcode": "test_timer", "topLevel": true,
              "inputs": { "DELAY": { "value": 20 } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("t1");
    h.scheduler.start_thread("t2");
    h.tick();
    assert_eq!(h.scheduler.timers().len(), 2);

    h.clock.advance_ms(100);
    h.scheduler.stop_all();
    h.tick();

    assert!(h.logged().is_empty());
    assert!(h.scheduler.timers().is_empty());
    assert!(h.scheduler.is_idle());
}

#[test]
fn test_timer_wakes_thread_on_the_tick_it_resolves() {
    let source = r#"{
        "blocks": [
            { "id": "t", "opcode": "test_timer", "topLevel": true, "next": "done",
              "inputs": { "DELAY": { "value": 30 } } },
            { "id": "done", "opcode": "test_log",
              "inputs": { "MESSAGE": { "value": "done" } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("t");
    h.tick();

    h.clock.advance_ms(29);
    h.tick();
    assert!(h.logged().is_empty());

    h.clock.advance_ms(1);
    let summary = h.tick();
    // Callback ran before the thread was stepped again
    assert_eq!(h.logged(), vec!["fired", "done"]);
    assert_eq!(summary.finished, 1);
    assert!(h.scheduler.timers().is_empty());
}

#[test]
fn test_start_thread_ignores_live_script_without_restart() {
    let source = r#"{
        "blocks": [
            { "id": "s", "opcode": "control_forever", "topLevel": true }
        ]
    }"#;

    let mut h = Harness::new(source);
    let first = h.scheduler.start_thread("s");
    assert!(first.is_some());
    assert!(h.scheduler.start_thread("s").is_none());
    assert_eq!(h.scheduler.threads().len(), 1);
    assert!(h.scheduler.start_thread("missing").is_none());
}

#[test]
fn test_forever_yields_every_tick() {
    let source = r#"{
        "blocks": [
            { "id": "f", "opcode": "control_forever", "topLevel": true,
              "inputs": { "SUBSTACK": { "block": "inc" } } },
            { "id": "inc", "opcode": "data_changevariableby",
              "fields": { "VARIABLE": "n" }, "inputs": { "VALUE": { "value": 1 } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("f");
    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.var("n").to_number(), 5.0);
    assert_eq!(h.scheduler.ticks(), 5);
}

#[test]
fn test_timer_left_by_finished_block_does_not_block_the_thread() {
    // schedule a long timer and move on; forever { n += 1 }
    let source = r#"{
        "blocks": [
            { "id": "t", "opcode": "test_schedule", "topLevel": true, "next": "loop",
              "inputs": { "DELAY": { "value": 10000 } } },
            { "id": "loop", "opcode": "control_forever",
              "inputs": { "SUBSTACK": { "block": "inc" } } },
            { "id": "inc", "opcode": "data_changevariableby",
              "fields": { "VARIABLE": "n" }, "inputs": { "VALUE": { "value": 1 } } }
        ]
    }"#;

    let mut h = Harness::new(source);
    h.scheduler.start_thread("t");
    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.var("n"), crate::engine::Value::Num(5.0));
    assert_eq!(h.status("t"), Some(ThreadStatus::Yielded));
    assert_eq!(h.scheduler.timers().len(), 1);
    assert!(h.logged().is_empty());
}
