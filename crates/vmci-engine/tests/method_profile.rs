//! Profile decoding tests
//!
//! Profiles are laid out by the in-memory VM's builder, which also records
//! the record sizes the VM would report, so every walk below runs with size
//! verification on unless a test turns it off.

mod common;

use common::{DemoMethod, Fixture};
use std::sync::Arc;
use vmci_engine::{ProfileError, ProfilingInfo, RuntimeOptions, TriState, VmciError};
use vmci_sdk::memory::layout::data_layout::{EXCEPTION_SEEN_FLAG, NULL_SEEN_FLAG};

const NULL_SEEN: u8 = 1 << NULL_SEEN_FLAG;
const EXCEPTION_SEEN: u8 = 1 << EXCEPTION_SEEN_FLAG;

fn profile_of(fx: &Fixture, method: u64) -> ProfilingInfo {
    fx.runtime
        .resolve_method(method)
        .unwrap()
        .profiling_info()
        .unwrap()
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

// ============================================================================
// Record sizes
// ============================================================================

#[test]
fn test_record_sizes_agree_with_vm() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 64);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .counter(0, 5)
        .multi_branch(4, 1, &[2])
        .multi_branch(8, 0, &[1, 2])
        .multi_branch(12, 3, &[1; 8])
        .receiver_type(20, 0, 1, 0, &[])
        .virtual_call(24, 1, &[], &[])
        .ret(28, 1, &[])
        .call_type(32, 2, &[0, 0])
        .parameters_type(36, &[0, 0, 0, 0]);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    let data = info.method_data().expect("profile");
    let sizes: Vec<i32> = data
        .normal_records()
        .unwrap()
        .iter()
        .map(|record| record.size().unwrap())
        .collect();
    // Header, then one length cell and two cells per switch row.
    assert_eq!(&sizes[..4], &[16, 8 + 8 + 32, 8 + 8 + 48, 8 + 8 + 144]);
    assert_eq!(sizes.len(), 9);
    assert_eq!(sizes.iter().sum::<i32>(), data.normal_data_size());
}

#[test]
fn test_size_mismatch_is_reported() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 32);
    let mut builder = fx.vm.method_data(demo.method);
    builder.counter(0, 5);
    let switch = builder.next_position();
    builder.multi_branch(4, 1, &[2, 3]).counter(10, 1);
    let md = builder.build().unwrap();
    fx.vm.set_profile_size(md, switch, 40);

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.execution_count(0).unwrap(), 5);
    match info.execution_count(10) {
        Err(VmciError::Profile(ProfileError::SizeMismatch {
            position,
            computed,
            reported,
            ..
        })) => {
            assert_eq!(position, switch);
            assert_eq!(computed, 8 + 8 + 48);
            assert_eq!(reported, 40);
        }
        other => panic!("expected a size mismatch, got {other:?}"),
    }
}

#[test]
fn test_size_checks_can_be_disabled() {
    let fx = Fixture::with_options(RuntimeOptions {
        verify_profile_sizes: false,
        ..RuntimeOptions::default()
    });
    let demo = DemoMethod::build(&fx.vm, 32);
    let mut builder = fx.vm.method_data(demo.method);
    builder.multi_branch(4, 1, &[2, 3]).counter(10, 7);
    let md = builder.build().unwrap();
    fx.vm.set_profile_size(md, 0, 40);

    assert_eq!(profile_of(&fx, demo.method).execution_count(10).unwrap(), 7);
}

#[test]
fn test_counter_uses_low_word_saturated() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 16);
    let mut builder = fx.vm.method_data(demo.method);
    builder.counter(0, 0xFFFF_FFF0).counter(4, (1 << 32) | 5);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.execution_count(0).unwrap(), i32::MAX);
    assert_eq!(info.execution_count(4).unwrap(), 5);
}

// ============================================================================
// Branches and switches
// ============================================================================

#[test]
fn test_branch_probabilities() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 32);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .branch(3, 7, 3)
        .branch(9, 0, 0)
        .jump(12, 5, 0)
        .jump(14, 0, 0)
        .counter(18, 4);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_close(info.branch_taken_probability(3).unwrap(), 0.7);
    assert_eq!(info.execution_count(3).unwrap(), 10);
    assert_close(info.branch_taken_probability(9).unwrap(), -1.0);
    assert_close(info.branch_taken_probability(12).unwrap(), 1.0);
    assert_close(info.branch_taken_probability(14).unwrap(), 0.0);
    assert_close(info.branch_taken_probability(18).unwrap(), -1.0);
    assert_close(info.branch_taken_probability(20).unwrap(), -1.0);
    assert_eq!(info.execution_count(20).unwrap(), -1);
}

#[test]
fn test_switch_probabilities_put_default_last() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 40);
    let mut builder = fx.vm.method_data(demo.method);
    builder.multi_branch(20, 2, &[5, 3]).multi_branch(30, 0, &[0, 0, 0]);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    let probabilities = info.switch_probabilities(20).unwrap().expect("executed switch");
    assert_eq!(probabilities.len(), 3);
    assert_close(probabilities[0], 0.5);
    assert_close(probabilities[1], 0.3);
    assert_close(probabilities[2], 0.2);
    assert_eq!(info.execution_count(20).unwrap(), 10);

    assert!(info.switch_probabilities(30).unwrap().is_none());
    assert!(info.switch_probabilities(31).unwrap().is_none());
}

// ============================================================================
// Type and call profiles
// ============================================================================

#[test]
fn test_receiver_type_profile() {
    let fx = Fixture::new();
    let a = fx.vm.klass("demo/A").build().unwrap();
    let b = fx.vm.klass("demo/B").build().unwrap();
    let demo = DemoMethod::build(&fx.vm, 16);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .receiver_type(4, NULL_SEEN, 0, 10, &[(b, 10), (a, 30)])
        .receiver_type(8, 0, 0, 0, &[(a, 10), (a, 20)])
        .receiver_type(12, 0, 3, 0, &[]);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    let profile = info.type_profile(4).unwrap().expect("type profile");
    assert_eq!(profile.null_seen, TriState::True);
    assert_eq!(profile.types.len(), 2);
    assert_eq!(profile.types[0].item.klass_pointer(), a);
    assert_close(profile.types[0].probability, 0.6);
    assert_eq!(profile.types[1].item.name().unwrap(), "Ldemo/B;");
    assert_close(profile.types[1].probability, 0.2);
    assert_close(profile.not_recorded_probability, 0.2);
    assert_eq!(info.null_seen(4).unwrap(), TriState::True);

    let merged = info.type_profile(8).unwrap().expect("merged profile");
    assert_eq!(merged.null_seen, TriState::False);
    assert_eq!(merged.types.len(), 1);
    assert_close(merged.types[0].probability, 1.0);
    assert_close(merged.not_recorded_probability, 0.0);

    assert!(info.type_profile(12).unwrap().is_none());
    assert_eq!(info.execution_count(12).unwrap(), 3);
}

#[test]
fn test_virtual_call_profiles() {
    let fx = Fixture::new();
    let receiver = fx.vm.klass("demo/Receiver").build().unwrap();
    let demo = DemoMethod::build(&fx.vm, 16);
    let other = fx
        .vm
        .method(demo.pool)
        .code(&[0; 2])
        .build().unwrap();
    let mut builder = fx.vm.method_data(demo.method);
    builder.virtual_call(6, 5, &[(receiver, 15)], &[(demo.method, 12), (other, 8)]);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.execution_count(6).unwrap(), 20);

    let types = info.type_profile(6).unwrap().expect("receiver types");
    assert_eq!(types.types.len(), 1);
    assert_close(types.types[0].probability, 0.75);

    let methods = info.method_profile(6).unwrap().expect("call targets");
    assert_eq!(methods.methods.len(), 2);
    assert!(Arc::ptr_eq(
        &methods.methods[0].item,
        &fx.runtime.resolve_method(demo.method).unwrap()
    ));
    assert_close(methods.methods[0].probability, 0.6);
    assert_eq!(methods.methods[1].item.method_pointer(), other);
    assert_close(methods.methods[1].probability, 0.4);
    assert_close(methods.not_recorded_probability, 0.0);

    assert!(info.method_profile(7).unwrap().is_none());
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_exception_seen_searches_extra_region() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 64);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .bit(2, EXCEPTION_SEEN)
        .counter(4, 1)
        .extra_speculative_trap(10, 0, demo.method)
        .extra_bit(30, EXCEPTION_SEEN)
        .extra_free(32);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.exception_seen(2).unwrap(), TriState::True);
    assert_eq!(info.exception_seen(4).unwrap(), TriState::False);
    assert_eq!(info.exception_seen(30).unwrap(), TriState::True);
    assert_eq!(info.exception_seen(40).unwrap(), TriState::False);

    let extra = info.method_data().unwrap().extra_records().unwrap();
    assert_eq!(extra.len(), 2);
}

#[test]
fn test_full_extra_region_makes_exceptions_unknown() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 64);
    let mut builder = fx.vm.method_data(demo.method);
    builder.counter(4, 1).extra_bit(30, EXCEPTION_SEEN);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.exception_seen(30).unwrap(), TriState::True);
    assert_eq!(info.exception_seen(40).unwrap(), TriState::Unknown);
}

// ============================================================================
// Counters and maturity
// ============================================================================

#[test]
fn test_method_level_counters() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 8);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .counter(0, 1)
        .trap(3, 7)
        .decompiles(4)
        .overflow(2, 9)
        .ir_size(120);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    assert_eq!(info.deoptimization_count(3).unwrap(), 7);
    assert_eq!(info.deoptimization_count(4).unwrap(), 0);
    assert_eq!(info.deoptimization_count(25).unwrap(), -1);
    assert_eq!(info.deoptimization_count(-1).unwrap(), -1);
    assert_eq!(info.decompile_count().unwrap(), 4);
    assert_eq!(info.compiled_ir_size().unwrap(), 120);

    let data = info.method_data().unwrap();
    assert_eq!(data.overflow_recompile_count().unwrap(), 2);
    assert_eq!(data.overflow_trap_count().unwrap(), 9);
}

#[test]
fn test_unprofiled_method_gets_neutral_answers() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 12);

    let info = profile_of(&fx, demo.method);
    assert!(info.method_data().is_none());
    assert_eq!(info.code_size(), 12);
    assert_eq!(info.execution_count(0).unwrap(), -1);
    assert_close(info.branch_taken_probability(0).unwrap(), -1.0);
    assert!(info.switch_probabilities(0).unwrap().is_none());
    assert!(info.type_profile(0).unwrap().is_none());
    assert!(info.method_profile(0).unwrap().is_none());
    assert_eq!(info.null_seen(0).unwrap(), TriState::Unknown);
    assert_eq!(info.exception_seen(0).unwrap(), TriState::Unknown);
    assert_eq!(info.deoptimization_count(1).unwrap(), 0);
    assert_eq!(info.decompile_count().unwrap(), 0);
    assert_eq!(info.compiled_ir_size().unwrap(), -1);
    assert!(!info.is_mature().unwrap());
}

#[test]
fn test_maturity_overrides() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 8);
    let mut builder = fx.vm.method_data(demo.method);
    builder.counter(0, 1).mature(false);
    builder.build().unwrap();

    let mut info = profile_of(&fx, demo.method);
    assert!(!info.is_mature().unwrap());
    info.set_mature();
    assert!(info.is_mature().unwrap());

    let forced = Fixture::with_options(RuntimeOptions {
        force_profile_maturity: Some(false),
        ..RuntimeOptions::default()
    });
    let demo = DemoMethod::build(&forced.vm, 8);
    let mut builder = forced.vm.method_data(demo.method);
    builder.counter(0, 1).mature(true);
    builder.build().unwrap();
    assert!(!profile_of(&forced, demo.method).is_mature().unwrap());
}

#[test]
fn test_forced_maturity_applies_without_profile() {
    let fx = Fixture::with_options(RuntimeOptions {
        force_profile_maturity: Some(true),
        ..RuntimeOptions::default()
    });
    let demo = DemoMethod::build(&fx.vm, 8);

    let info = profile_of(&fx, demo.method);
    assert!(info.method_data().is_none());
    assert!(info.is_mature().unwrap());
}

#[test]
fn test_profile_dump() {
    let fx = Fixture::new();
    let a = fx.vm.klass("demo/A").build().unwrap();
    let demo = DemoMethod::build(&fx.vm, 16);
    let mut builder = fx.vm.method_data(demo.method);
    builder
        .branch(3, 7, 3)
        .receiver_type(6, 0, 0, 0, &[(a, 4)])
        .extra_bit(9, EXCEPTION_SEEN)
        .extra_free(8);
    builder.build().unwrap();

    let info = profile_of(&fx, demo.method);
    let dump = info.method_data().unwrap().to_string();
    assert!(dump.contains("BranchData bci=3 taken=7 not_taken=3"), "{dump}");
    assert!(dump.contains("ReceiverTypeData bci=6 count=0 Ldemo/A;:1.000"), "{dump}");
    assert!(dump.contains("--- extra data ---"), "{dump}");
    assert!(dump.contains("BitData bci=9 exception_seen"), "{dump}");
}
