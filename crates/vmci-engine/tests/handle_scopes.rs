//! Object handle lifetime tests
//!
//! Exercises scoped, global and direct references against the in-memory VM,
//! checking which handles the VM sees deleted and when.

mod common;

use common::Fixture;
use std::sync::Arc;
use vmci_engine::{
    HandleError, JavaConstant, ObjectConstant, ObjectConstantScope, PoolConstant, RuntimeOptions,
};
use vmci_sdk::RawObject;

fn host_string(fx: &Fixture, text: &str) -> i64 {
    fx.vm.new_global_handle(Arc::new(text.to_string()))
}

#[test]
fn test_scoped_handles_cleared_on_close() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "scoped");

    let mut scope = fx.runtime.handles().open_local_scope("compile demo/Holder.run");
    let constant = fx.runtime.handles().wrap_handle(raw, false);
    assert_eq!(constant.raw_handle().unwrap(), raw);

    assert_eq!(scope.close().unwrap(), 1);
    assert_eq!(fx.vm.deleted_handles(), vec![raw]);

    let err = constant.raw_handle().unwrap_err();
    assert!(matches!(err, HandleError::Cleared { .. }));
    let message = err.to_string();
    assert!(message.contains("compile demo/Holder.run"), "{message}");
    assert!(message.contains("enable handle auditing"), "{message}");

    drop(constant);
    assert_eq!(fx.vm.double_deletes(), 0);
    assert_eq!(fx.runtime.handles().stats().live(), 0);
}

#[test]
fn test_wrapper_outliving_scope_is_deleted_once() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "short");

    let constant = {
        let _scope = ObjectConstantScope::open_local("outer");
        fx.runtime.handles().wrap_handle(raw, true)
    };
    assert!(constant.raw_handle().is_err());
    assert!(constant.is_compressed());
    drop(constant);

    assert_eq!(fx.vm.deleted_handles(), vec![raw]);
    assert_eq!(fx.vm.double_deletes(), 0);
}

#[test]
fn test_global_handle_deleted_with_last_wrapper() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "global");
    let before = fx.vm.live_global_handles();

    let uncompressed = fx.runtime.handles().wrap_handle(raw, false);
    let compressed = uncompressed.compress();
    assert!(Arc::ptr_eq(uncompressed.handle(), compressed.handle()));
    assert!(compressed.same_object(&uncompressed).unwrap());

    drop(uncompressed);
    assert_eq!(compressed.raw_handle().unwrap(), raw);
    assert!(fx.vm.deleted_handles().is_empty());

    drop(compressed);
    assert_eq!(fx.vm.deleted_handles(), vec![raw]);
    assert_eq!(fx.vm.live_global_handles(), before - 1);

    let stats = fx.runtime.handles().stats();
    assert_eq!(stats.created(), 1);
    assert_eq!(stats.deleted(), 1);
}

#[test]
fn test_global_scope_shields_from_enclosing_local_scope() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "shielded");

    let mut outer = fx.runtime.handles().open_local_scope("outer");
    let constant = {
        let mut global = fx.runtime.handles().enter_global_scope();
        assert!(global.is_global());
        let constant = fx.runtime.handles().wrap_handle(raw, false);
        assert_eq!(global.close().unwrap(), 0);
        constant
    };
    assert_eq!(outer.close().unwrap(), 0);
    assert_eq!(constant.raw_handle().unwrap(), raw);

    drop(constant);
    assert_eq!(fx.vm.deleted_handles(), vec![raw]);
}

#[test]
fn test_nested_local_scopes_clear_innermost_only() {
    let fx = Fixture::new();
    let outer_raw = host_string(&fx, "outer");
    let inner_raw = host_string(&fx, "inner");

    let mut outer = fx.runtime.handles().open_local_scope("outer");
    let outer_constant = fx.runtime.handles().wrap_handle(outer_raw, false);
    let mut inner = fx.runtime.handles().open_local_scope("inner");
    let inner_constant = fx.runtime.handles().wrap_handle(inner_raw, false);

    assert_eq!(ObjectConstantScope::depth(), 2);
    assert_eq!(inner.close().unwrap(), 1);
    assert!(inner_constant.raw_handle().is_err());
    assert_eq!(outer_constant.raw_handle().unwrap(), outer_raw);

    assert_eq!(outer.close().unwrap(), 1);
    assert!(outer_constant.raw_handle().is_err());
    assert_eq!(fx.vm.deleted_handles(), vec![inner_raw, outer_raw]);
}

#[test]
fn test_closing_twice_is_a_no_op() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "twice");

    let mut scope = fx.runtime.handles().open_local_scope("twice");
    let _constant = fx.runtime.handles().wrap_handle(raw, false);
    assert_eq!(scope.close().unwrap(), 1);
    assert_eq!(scope.close().unwrap(), 0);
    drop(scope);
    assert_eq!(fx.vm.deleted_handles(), vec![raw]);
}

#[test]
fn test_out_of_order_close_leaves_stack_intact() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "kept");

    let mut outer = fx.runtime.handles().open_local_scope("outer");
    let constant = fx.runtime.handles().wrap_handle(raw, false);
    let mut inner = fx.runtime.handles().open_local_scope("inner");

    let err = outer.close().unwrap_err();
    assert!(matches!(
        err,
        HandleError::ScopeNotActive { ref description, depth: 2 } if description.as_deref() == Some("outer")
    ));
    assert_eq!(constant.raw_handle().unwrap(), raw);

    inner.close().unwrap();
    assert_eq!(outer.close().unwrap(), 1);
    assert_eq!(ObjectConstantScope::depth(), 0);
}

#[test]
fn test_out_of_order_drop_does_not_capture_later_handles() {
    let fx = Fixture::new();
    let outer_raw = host_string(&fx, "outer");
    let later_raw = host_string(&fx, "later");

    let outer = fx.runtime.handles().open_local_scope("a");
    let outer_constant = fx.runtime.handles().wrap_handle(outer_raw, false);
    let mut inner = fx.runtime.handles().open_local_scope("b");
    drop(outer);
    assert!(outer_constant.raw_handle().is_err());
    assert_eq!(fx.vm.deleted_handles(), vec![outer_raw]);

    inner.close().unwrap();
    assert_eq!(ObjectConstantScope::depth(), 0);
    assert_eq!(ObjectConstantScope::current_description(), None);

    let later = fx.runtime.handles().wrap_handle(later_raw, false);
    drop(later);
    assert_eq!(fx.vm.deleted_handles(), vec![outer_raw, later_raw]);
    assert_eq!(fx.runtime.handles().stats().live(), 0);
    assert_eq!(fx.vm.double_deletes(), 0);
}

#[test]
fn test_audit_mode_reports_allocation_site() {
    let fx = Fixture::with_options(RuntimeOptions {
        audit_handles: true,
        ..RuntimeOptions::default()
    });
    let raw = host_string(&fx, "audited");

    let mut scope = fx.runtime.handles().open_local_scope("audit");
    let constant = fx.runtime.handles().wrap_handle(raw, false);
    scope.close().unwrap();

    let message = constant.raw_handle().unwrap_err().to_string();
    assert!(message.contains("from audit"), "{message}");
    assert!(message.contains("allocated at"), "{message}");
}

#[test]
fn test_direct_objects_need_no_handle() {
    let fx = Fixture::new();
    let object = fx.runtime.handles().wrap(RawObject::Direct(Arc::new(7u32)));
    assert!(object.raw_handle().is_none());
    let value = object
        .host_object()
        .and_then(|o| o.downcast_ref::<u32>())
        .copied();
    assert_eq!(value, Some(7));
    assert!(object.compress().is_compressed());
    assert_eq!(fx.runtime.handles().stats().created(), 0);
}

#[test]
fn test_pool_strings_follow_the_active_scope() {
    let fx = Fixture::new();
    let mut cp = fx.vm.constant_pool();
    let greeting = cp.string("hello");
    let pool = cp.build().unwrap();
    fx.vm.klass("demo/Strings").constant_pool(pool).build().unwrap();
    let pool = fx.runtime.constant_pool(pool).unwrap();

    let string_handle = |constant: &PoolConstant| match constant {
        PoolConstant::Value(JavaConstant::Object(ObjectConstant::Indirect(indirect))) => {
            indirect.clone()
        }
        other => panic!("expected an indirect object, got {other:?}"),
    };

    let mut scope = fx.runtime.handles().open_local_scope("ldc");
    let first = string_handle(&pool.lookup_constant(greeting).unwrap());
    let second = string_handle(&pool.lookup_constant(greeting).unwrap());
    assert_ne!(first.raw_handle().unwrap(), second.raw_handle().unwrap());
    assert!(first.same_object(&second).unwrap());
    assert_eq!(scope.close().unwrap(), 2);
    assert!(first.raw_handle().is_err());

    let unscoped = string_handle(&pool.lookup_constant(greeting).unwrap());
    assert!(unscoped.raw_handle().is_ok());
    assert_eq!(fx.vm.double_deletes(), 0);
}

#[test]
fn test_scopes_do_not_cross_threads() {
    let fx = Fixture::new();
    let raw = host_string(&fx, "elsewhere");

    let mut scope = fx.runtime.handles().open_local_scope("main");
    let runtime = fx.runtime.clone();
    let constant = std::thread::spawn(move || runtime.handles().wrap_handle(raw, false))
        .join()
        .unwrap();
    assert_eq!(scope.close().unwrap(), 0);
    assert_eq!(constant.raw_handle().unwrap(), raw);
}
