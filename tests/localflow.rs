//! Integration tests for the flow-sensitive summarizers.
//!
//! The reachability strategy must agree with the plain bytecode scan on
//! methods without dead code and prune calls the control flow can never
//! reach; the types strategy must tighten monomorphic virtual calls and
//! refuse, through `can_summarize`, the method shapes it does not model.

use cilgc::metadata::{layout, ExceptionRegion, HandlerKind};
use cilgc::prelude::*;

fn body(operations: Vec<Operation>) -> MethodBody {
    let (operations, _) = layout(operations);
    MethodBody {
        operations,
        max_stack: 8,
        ..MethodBody::default()
    }
}

struct CallWorld {
    program: WholeProgram,
    caller: MethodId,
    base_bar: MethodId,
    d_bar: MethodId,
    helper: MethodId,
}

/// A caller that constructs `D`, calls `Base::Bar` virtually on it, and
/// non-virtually calls a static helper behind an unconditional branch.
fn call_world(dead_helper_call: bool) -> CallWorld {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("App", true);

    let base = b.add_type(app, "App", "Base", None, TypeFlags::ABSTRACT);
    let base_bar = b.add_method(
        base,
        "Bar",
        MethodFlags::VIRTUAL | MethodFlags::ABSTRACT,
        Visibility::Public,
        Vec::new(),
    );
    let d = b.add_type(app, "App", "D", Some(base), TypeFlags::empty());
    let d_ctor = b.add_method(d, ".ctor", MethodFlags::CONSTRUCTOR, Visibility::Public, Vec::new());
    let d_bar = b.add_method(d, "Bar", MethodFlags::VIRTUAL, Visibility::Public, Vec::new());

    let program_type = b.add_class(app, "App", "Program");
    let helper = b.add_method(
        program_type,
        "Helper",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );
    let caller = b.add_method(
        program_type,
        "Caller",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );

    let d_ctor_ref = b.method_ref(d_ctor);
    let bar_ref = b.method_ref(base_bar);
    let helper_ref = b.method_ref(helper);
    let operations = if dead_helper_call {
        // The helper call sits between an unconditional branch and its
        // target; no path reaches it.
        vec![
            Operation::new(OpCode::Newobj, Operand::Method(d_ctor_ref)),
            Operation::new(OpCode::Callvirt, Operand::Method(bar_ref)),
            Operation::new(OpCode::Br, Operand::Target(4)),
            Operation::new(OpCode::Call, Operand::Method(helper_ref)),
            Operation::new(OpCode::Ret, Operand::None),
        ]
    } else {
        vec![
            Operation::new(OpCode::Newobj, Operand::Method(d_ctor_ref)),
            Operation::new(OpCode::Callvirt, Operand::Method(bar_ref)),
            Operation::new(OpCode::Call, Operand::Method(helper_ref)),
            Operation::new(OpCode::Ret, Operand::None),
        ]
    };
    b.set_body(caller, body(operations));

    CallWorld {
        program: b.finish(),
        caller,
        base_bar,
        d_bar,
        helper,
    }
}

/// Without dead code the reachability strategy reports exactly what the
/// plain scan reports.
#[test]
fn reachability_flow_matches_bytecode_scan_without_dead_code() -> Result<()> {
    let w = call_world(false);
    let flow = ReachabilityFlowSummarizer::new();
    let scan = BytecodeSummarizer::new();
    assert!(flow.can_summarize(&w.program, w.caller));

    let flow_summary = flow.summarize(&w.program, w.caller)?;
    let scan_summary = scan.summarize(&w.program, w.caller)?;
    assert_eq!(
        flow_summary.nonvirtually_called_methods,
        scan_summary.nonvirtually_called_methods
    );
    assert_eq!(
        flow_summary.virtually_called_methods,
        scan_summary.virtually_called_methods
    );
    assert_eq!(flow_summary.reachable_fields, scan_summary.reachable_fields);
    Ok(())
}

/// A call in an unreachable block is pruned by the flow strategy but kept by
/// the plain scan.
#[test]
fn reachability_flow_prunes_dead_calls() -> Result<()> {
    let w = call_world(true);
    let flow_summary = ReachabilityFlowSummarizer::new().summarize(&w.program, w.caller)?;
    let scan_summary = BytecodeSummarizer::new().summarize(&w.program, w.caller)?;

    assert!(!flow_summary.nonvirtually_called_methods.contains(&w.helper));
    assert!(scan_summary.nonvirtually_called_methods.contains(&w.helper));
    Ok(())
}

/// The types strategy resolves a monomorphic `callvirt` to the concrete
/// override; the plain scan records only the declared target.
#[test]
fn types_flow_tightens_monomorphic_callvirt() -> Result<()> {
    let w = call_world(false);
    let tightened = TypesFlowSummarizer::new().summarize(&w.program, w.caller)?;
    let scan = BytecodeSummarizer::new().summarize(&w.program, w.caller)?;

    assert!(tightened.virtually_called_methods.contains(&w.d_bar));
    assert!(!tightened.virtually_called_methods.contains(&w.base_bar));
    assert!(scan.virtually_called_methods.contains(&w.base_bar));
    assert!(!scan.virtually_called_methods.contains(&w.d_bar));
    Ok(())
}

/// Exception regions disqualify both flow strategies, and the plain scan
/// handles the same method without complaint.
#[test]
fn exception_regions_force_the_bytecode_fallback() -> Result<()> {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("App", true);
    let program_type = b.add_class(app, "App", "Program");
    let guarded = b.add_method(
        program_type,
        "Guarded",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );
    let (operations, offsets) = layout(vec![
        Operation::new(OpCode::Nop, Operand::None),
        Operation::new(OpCode::Leave, Operand::Target(3)),
        Operation::new(OpCode::Pop, Operand::None),
        Operation::new(OpCode::Ret, Operand::None),
    ]);
    let region = ExceptionRegion {
        kind: HandlerKind::Catch,
        try_start: offsets[0],
        try_end: offsets[2],
        handler_start: offsets[2],
        handler_end: offsets[3],
        filter_start: None,
        catch_type: None,
    };
    b.set_body(
        guarded,
        MethodBody {
            operations,
            exception_regions: vec![region],
            max_stack: 1,
            ..MethodBody::default()
        },
    );
    let program = b.finish();

    assert!(!ReachabilityFlowSummarizer::new().can_summarize(&program, guarded));
    assert!(!TypesFlowSummarizer::new().can_summarize(&program, guarded));
    let summary = BytecodeSummarizer::new().summarize(&program, guarded)?;
    assert!(summary.is_empty());
    Ok(())
}

/// The types strategy cannot model a call through an unresolved reference and
/// reports an analysis failure the driver recovers from.
#[test]
fn unresolved_call_is_an_analysis_failure_for_types_flow() {
    let mut b = ProgramBuilder::new();
    let app = b.add_assembly("App", true);
    let program_type = b.add_class(app, "App", "Program");
    let caller = b.add_method(
        program_type,
        "Caller",
        MethodFlags::STATIC,
        Visibility::Public,
        Vec::new(),
    );
    let missing = b.unresolved_method_ref("Vendor.Widget::Render");
    b.set_body(
        caller,
        body(vec![
            Operation::new(OpCode::Call, Operand::Method(missing)),
            Operation::new(OpCode::Ret, Operand::None),
        ]),
    );
    let program = b.finish();

    let result = TypesFlowSummarizer::new().summarize(&program, caller);
    assert!(matches!(result, Err(Error::Analysis(_))));
}
