//! Speculation log tests
//!
//! Reasons are built from reason groups keyed by the demo method and a BCI,
//! the way a compiler records a speculation per guarded instruction.

mod common;

use common::{DemoMethod, Fixture};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use vmci_engine::speculation::{
    ContextKind, ContextValue, SpeculationEncoding, SpeculationReasonGroup, DIGEST_LENGTH,
    NO_SPECULATION,
};
use vmci_engine::{
    ResolvedJavaMethod, SpeculationError, SpeculationLog, SpeculationReason, VmciError,
};

fn null_check_group() -> Arc<SpeculationReasonGroup> {
    SpeculationReasonGroup::new("NullCheck", &[ContextKind::Method, ContextKind::Int])
}

fn null_check(
    group: &Arc<SpeculationReasonGroup>,
    method: &Arc<ResolvedJavaMethod>,
    bci: i32,
) -> Arc<dyn SpeculationReason> {
    group
        .create_reason(vec![
            ContextValue::Method(method.clone()),
            ContextValue::Int(bci),
        ])
        .unwrap()
}

#[derive(Debug)]
struct NoContext;

impl SpeculationReason for NoContext {
    fn encode(&self, _encoding: &mut SpeculationEncoding) {}
}

#[test]
fn test_equal_reasons_share_an_id() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 16);
    let method = fx.runtime.resolve_method(demo.method).unwrap();
    let group = null_check_group();
    let log = fx.runtime.new_speculation_log().unwrap();
    assert!(!log.has_speculations());

    let first = log.speculate(null_check(&group, &method, 3)).unwrap();
    let again = log.speculate(null_check(&group, &method, 3)).unwrap();
    let other = log.speculate(null_check(&group, &method, 7)).unwrap();

    // group id, method pointer, bci
    assert_eq!(first.encoding().len(), 4 + 8 + 4);
    assert_eq!(first.id(), 16);
    assert_eq!(again.id(), first.id());
    assert_eq!(other.id(), (16 << 5) | 16);
    assert!(log.has_speculations());

    let flattened = log.flattened_speculations(false).unwrap();
    assert_eq!(flattened.len(), 32);
    assert_eq!(&flattened[..16], first.encoding());
    assert_eq!(&flattened[16..], other.encoding());

    let found = log.lookup_speculation(other.id()).unwrap().expect("speculation");
    assert_eq!(found.encoding(), other.encoding());
    assert!(log.lookup_speculation(NO_SPECULATION).unwrap().is_none());
    assert!(matches!(
        log.lookup_speculation((5 << 5) | 16),
        Err(VmciError::Speculation(SpeculationError::UnknownId(_)))
    ));
    assert!(matches!(
        log.lookup_speculation(other.id() + 1),
        Err(VmciError::Speculation(SpeculationError::UnknownId(_)))
    ));
}

#[test]
fn test_long_encodings_are_digested() {
    let fx = Fixture::new();
    let group = SpeculationReasonGroup::new(
        "Wide",
        &[
            ContextKind::Long,
            ContextKind::Long,
            ContextKind::Long,
            ContextKind::Long,
        ],
    );
    let reason = group
        .create_reason((1..=4).map(ContextValue::Long).collect())
        .unwrap();
    let log = fx.runtime.new_speculation_log().unwrap();
    let speculation = log.speculate(reason).unwrap();

    assert_eq!(speculation.original_bytes().len(), 4 + 4 * 8);
    assert_eq!(speculation.encoding().len(), DIGEST_LENGTH);
    assert_eq!(
        speculation.encoding(),
        Sha1::digest(speculation.original_bytes()).as_slice()
    );
    assert_eq!(speculation.id() & 31, DIGEST_LENGTH as i64);

    let found = log
        .lookup_speculation(speculation.id())
        .unwrap()
        .expect("speculation");
    assert_eq!(found.original_bytes(), speculation.original_bytes());
}

#[test]
fn test_failed_speculations_are_not_repeated() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 16);
    let method = fx.runtime.resolve_method(demo.method).unwrap();
    let group = null_check_group();
    let log = method.speculation_log().unwrap();
    assert!(Arc::ptr_eq(&log, &method.speculation_log().unwrap()));
    assert!(!log.is_managed());

    let reason = null_check(&group, &method, 5);
    let speculation = log.speculate(reason.clone()).unwrap();
    assert!(log.add_failed_speculation(&speculation).unwrap());
    assert!(!log.add_failed_speculation(&speculation).unwrap());

    // Failures become visible at the next collection.
    assert!(log.may_speculate(reason.as_ref()).unwrap());
    log.collect_failed_speculations().unwrap();
    assert!(!log.may_speculate(reason.as_ref()).unwrap());
    assert!(log.may_speculate(null_check(&group, &method, 6).as_ref()).unwrap());

    let next_compilation = SpeculationLog::for_method(fx.runtime.clone(), demo.method).unwrap();
    assert_eq!(
        next_compilation.failed_speculations_address(),
        log.failed_speculations_address()
    );
    next_compilation.collect_failed_speculations().unwrap();
    assert!(!next_compilation.may_speculate(reason.as_ref()).unwrap());
}

#[test]
fn test_validation_detects_failure_during_compilation() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 16);
    let method = fx.runtime.resolve_method(demo.method).unwrap();
    let group = null_check_group();
    let log = fx.runtime.new_speculation_log().unwrap();

    let speculation = log.speculate(null_check(&group, &method, 9)).unwrap();
    assert_eq!(
        log.flattened_speculations(true).unwrap(),
        speculation.encoding()
    );

    log.add_failed_speculation(&speculation).unwrap();
    match log.flattened_speculations(true) {
        Err(VmciError::Speculation(SpeculationError::Failed { reason })) => {
            assert!(reason.contains("NullCheck"), "{reason}");
        }
        other => panic!("expected a failed speculation, got {other:?}"),
    }
}

#[test]
fn test_owned_list_is_released_on_drop() {
    let fx = Fixture::new();
    let log = fx.runtime.new_speculation_log().unwrap();
    assert!(log.is_managed());
    let address = log.failed_speculations_address();
    assert!(fx.vm.released_speculation_lists().is_empty());

    drop(log);
    assert_eq!(fx.vm.released_speculation_lists(), vec![address]);

    let demo = DemoMethod::build(&fx.vm, 4);
    drop(SpeculationLog::for_method(fx.runtime.clone(), demo.method).unwrap());
    assert_eq!(fx.vm.released_speculation_lists(), vec![address]);
}

#[test]
fn test_empty_reasons_are_rejected() {
    let fx = Fixture::new();
    let log = fx.runtime.new_speculation_log().unwrap();
    assert!(matches!(
        log.speculate(Arc::new(NoContext)),
        Err(VmciError::Speculation(SpeculationError::EmptyEncoding(_)))
    ));
    assert!(log.may_speculate(&NoContext).is_err());
    assert!(!log.has_speculations());
}

#[test]
fn test_concurrent_speculation() {
    let fx = Fixture::new();
    let demo = DemoMethod::build(&fx.vm, 64);
    let method = fx.runtime.resolve_method(demo.method).unwrap();
    let group = null_check_group();
    let log = fx.runtime.new_speculation_log().unwrap();

    let (log, group, method) = (&log, &group, &method);
    let ids: Vec<Vec<i64>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(move || {
                    (0..8)
                        .map(|bci| log.speculate(null_check(group, method, bci)).unwrap().id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    for other in &ids[1..] {
        assert_eq!(other, &ids[0]);
    }
    let mut distinct = ids[0].clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 8);
    assert_eq!(log.flattened_speculations(false).unwrap().len(), 8 * 16);
}
