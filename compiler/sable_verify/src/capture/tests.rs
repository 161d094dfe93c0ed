use pretty_assertions::assert_eq;

use sable_ir::Name;

use crate::ir::{Block, Capture, Instr, Isolation, Terminator};
use crate::report::{EscapeSink, FaultKind};
use crate::test_helpers::{b, make_func, owned_param, ref_borrowed, ref_owned, s, scalar, v};

use super::{analyze_captures, CaptureMode};

fn closure_capturing(var: u32, by_move: bool) -> Instr {
    Instr::MakeClosure {
        dst: v(2),
        func: Name::from_raw(9),
        captures: vec![Capture {
            var: v(var),
            by_move,
        }],
    }
}

// ── Capture mode resolution ─────────────────────────────────────

#[test]
fn borrowed_capture_in_synchronous_closure_is_by_borrow() {
    // fn f(x) { let r = borrow x in 1; let k = closure[g](r); let y = k(); close 1 }
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
                Instr::CallClosure {
                    dst: v(3),
                    closure: v(2),
                    args: vec![],
                },
                Instr::CloseScope { scope: s(1) },
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert!(analysis.faults.is_empty());
    assert!(analysis.escaping.is_empty());
    assert_eq!(analysis.captures.len(), 1);
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByBorrow);
    assert_eq!(analysis.captures[0].closure, v(2));
    assert_eq!(analysis.captures[0].var, v(1));
}

#[test]
fn owned_capture_is_by_copy() {
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![closure_capturing(0, false)],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByCopy);
    assert!(analysis.faults.is_empty());
}

#[test]
fn moved_owned_capture_is_by_consume() {
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![closure_capturing(0, true)],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByConsume);
}

#[test]
fn scalar_capture_is_always_by_copy() {
    // Even a move marker cannot make a scalar capture anything else.
    let func = make_func(
        vec![],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Let {
                    dst: v(0),
                    value: crate::ir::RValue::Literal(crate::ir::LitValue::Int(7)),
                },
                closure_capturing(0, true),
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![scalar(), scalar(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByCopy);
}

// ── Escape detection ────────────────────────────────────────────

#[test]
fn returned_closure_with_borrowed_capture_is_flagged() {
    // fn f(x) { let r = borrow x in 1; let k = closure[g](r); return k }
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
            ],
            terminator: Terminator::Return { value: Some(v(2)) },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.faults.len(), 1);
    assert!(matches!(
        analysis.faults[0].kind,
        FaultKind::BorrowEscape {
            var,
            closure,
            sink: EscapeSink::Returned,
            ..
        } if var == v(1) && closure == v(2)
    ));
    // The mode records what the source asked for, not a silent coercion.
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByBorrow);
}

#[test]
fn stored_closure_with_borrowed_capture_is_flagged() {
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
                Instr::Construct {
                    dst: v(3),
                    args: vec![v(2)],
                },
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.faults.len(), 1);
    assert!(matches!(
        analysis.faults[0].kind,
        FaultKind::BorrowEscape {
            sink: EscapeSink::Stored,
            ..
        }
    ));
}

#[test]
fn dispatched_closure_from_unconfined_code_is_an_escape() {
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
                Instr::Dispatch {
                    closure: v(2),
                    domain: Isolation::Domain(Name::from_raw(5)),
                },
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.faults.len(), 1);
    assert!(matches!(
        analysis.faults[0].kind,
        FaultKind::BorrowEscape {
            sink: EscapeSink::Dispatched,
            ..
        }
    ));
}

#[test]
fn dispatch_from_isolated_function_is_not_an_escape_here() {
    // The isolation checker owns this case; the capture analyzer must
    // not pre-empt it with a borrow-escape report.
    let mut func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
                Instr::Dispatch {
                    closure: v(2),
                    domain: Isolation::Unconfined,
                },
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned()],
    );
    func.isolation = Isolation::Domain(Name::from_raw(5));

    let analysis = analyze_captures(&func);
    assert!(analysis.escaping.is_empty());
    assert!(analysis.faults.is_empty());
    assert_eq!(analysis.captures[0].mode, CaptureMode::ByBorrow);
}

#[test]
fn confining_the_closure_removes_the_flag() {
    // Same shape as the returned-closure case, but invoked synchronously
    // instead: the diagnostic disappears.
    let func = make_func(
        vec![owned_param(0)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::Borrow {
                    dst: v(1),
                    source: v(0),
                    scope: s(1),
                },
                closure_capturing(1, false),
                Instr::CallClosure {
                    dst: v(3),
                    closure: v(2),
                    args: vec![],
                },
                Instr::CloseScope { scope: s(1) },
            ],
            terminator: Terminator::Return { value: Some(v(3)) },
        }],
        vec![ref_owned(), ref_borrowed(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert!(analysis.faults.is_empty());
}

// ── Robustness ──────────────────────────────────────────────────

#[test]
fn out_of_range_capture_produces_no_record() {
    // The tracker reports the malformed use; the analyzer stays silent.
    let func = make_func(
        vec![],
        vec![Block {
            id: b(0),
            body: vec![Instr::MakeClosure {
                dst: v(0),
                func: Name::from_raw(9),
                captures: vec![Capture {
                    var: v(9),
                    by_move: false,
                }],
            }],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert!(analysis.captures.is_empty());
    assert!(analysis.faults.is_empty());
}

#[test]
fn captures_of_filters_by_closure() {
    let func = make_func(
        vec![owned_param(0), owned_param(1)],
        vec![Block {
            id: b(0),
            body: vec![
                Instr::MakeClosure {
                    dst: v(2),
                    func: Name::from_raw(8),
                    captures: vec![Capture {
                        var: v(0),
                        by_move: false,
                    }],
                },
                Instr::MakeClosure {
                    dst: v(3),
                    func: Name::from_raw(9),
                    captures: vec![Capture {
                        var: v(1),
                        by_move: false,
                    }],
                },
            ],
            terminator: Terminator::Return { value: None },
        }],
        vec![ref_owned(), ref_owned(), ref_owned(), ref_owned()],
    );

    let analysis = analyze_captures(&func);
    assert_eq!(analysis.captures.len(), 2);
    let of_second: Vec<_> = analysis.captures_of(v(3)).collect();
    assert_eq!(of_second.len(), 1);
    assert_eq!(of_second[0].var, v(1));
}
