//! Constant pool decoding tests
//!
//! Builds one pool covering every entry kind the decoder understands, links
//! part of it, and checks lookups through both plain and cache indices.

mod common;

use common::Fixture;
use std::sync::Arc;
use vmci_engine::meta::{JvmConstant, PrimitiveConstant, ACC_STATIC};
use vmci_engine::{
    ConstantPool, JavaConstant, JavaField, JavaKind, JavaMethod, JavaType, MetadataError, Opcode,
    PoolConstant, VmciError,
};
use vmci_sdk::memory::layout::CPCACHE_INDEX_TAG;
use vmci_sdk::{RawConstant, RawObject, ResolvedFieldInfo};

/// Indices into the demo pool. `*_op` fields are rewritten instruction
/// operands, the others plain constant pool indices.
struct DemoPool {
    pool: Arc<ConstantPool>,
    pool_address: u64,
    target: u64,
    compute: u64,
    lazy: u64,
    int: i32,
    long: i32,
    float: i32,
    double: i32,
    text: i32,
    descriptor: i32,
    target_class: i32,
    missing_class: i32,
    count_cpi: i32,
    count_op: i32,
    unlinked_op: i32,
    gone_op: i32,
    compute_cpi: i32,
    compute_op: i32,
    vanish_op: i32,
    invoke_exact_op: i32,
    lazy_op: i32,
    indy_cpi: i32,
    indy_op: i32,
}

fn demo_pool(fx: &Fixture) -> DemoPool {
    let vm = &fx.vm;
    vm.klass("java/lang/invoke/MethodHandle").initialized().build().unwrap();
    let lazy = vm.klass("demo/Lazy").build().unwrap();

    let mut target_cp = vm.constant_pool();
    let compute_name = target_cp.utf8("compute");
    let compute_sig = target_cp.utf8("(I)J");
    let target_pool = target_cp.build().unwrap();
    let target = vm
        .klass("demo/Target")
        .initialized()
        .constant_pool(target_pool)
        .build().unwrap();
    let compute = vm
        .method(target_pool)
        .name_and_signature(compute_name, compute_sig)
        .code(&[0; 6])
        .build().unwrap();

    let mut cp = vm.constant_pool();
    let int = cp.integer(42);
    let long = cp.long(-1 << 40);
    let float = cp.float(1.5);
    let double = cp.double(-0.25);
    let text = cp.utf8("hello");
    let descriptor = cp.utf8("(ILjava/lang/String;)V");
    let target_class = cp.class(target);
    let missing_class = cp.unresolved_class("demo/Missing");
    let handle_class = cp.unresolved_class("java/lang/invoke/MethodHandle");
    let lazy_class = cp.unresolved_class("demo/Lazy");

    let count_cpi = cp.field_ref(target_class, "count", "I");
    let count_op = cp.cache_entry(count_cpi);
    let unlinked = cp.field_ref(target_class, "other", "J");
    let unlinked_op = cp.cache_entry(unlinked);
    let gone = cp.field_ref(missing_class, "gone", "Ljava/lang/String;");
    let gone_op = cp.cache_entry(gone);
    let lazy_field = cp.field_ref(lazy_class, "value", "I");
    let lazy_op = cp.cache_entry(lazy_field);

    let compute_cpi = cp.method_ref(target_class, "compute", "(I)J");
    let compute_op = cp.cache_entry(compute_cpi);
    let vanish = cp.method_ref(missing_class, "vanish", "()V");
    let vanish_op = cp.cache_entry(vanish);
    let invoke_exact = cp.method_ref(handle_class, "invokeExact", "([Ljava/lang/Object;)Ljava/lang/Object;");
    let invoke_exact_op = cp.cache_entry(invoke_exact);

    let indy_cpi = cp.invoke_dynamic(0, "apply", "()Ljava/lang/Runnable;");
    let indy_op = cp.indy_cache_entry(indy_cpi);

    let pool_address = cp.build().unwrap();
    vm.klass("demo/Holder").constant_pool(pool_address).build().unwrap();

    vm.link_field(
        pool_address,
        count_cpi,
        ResolvedFieldInfo {
            holder: target,
            flags: ACC_STATIC as i32,
            offset: 24,
            index: 3,
        },
    )
    .unwrap();
    vm.link_method(pool_address, compute_cpi, compute).unwrap();

    DemoPool {
        pool: fx.runtime.constant_pool(pool_address).unwrap(),
        pool_address,
        target,
        compute,
        lazy,
        int,
        long,
        float,
        double,
        text,
        descriptor,
        target_class,
        missing_class,
        count_cpi,
        count_op,
        unlinked_op,
        gone_op,
        compute_cpi,
        compute_op,
        vanish_op,
        invoke_exact_op,
        lazy_op,
        indy_cpi,
        indy_op,
    }
}

fn primitive(constant: PoolConstant) -> PrimitiveConstant {
    match constant {
        PoolConstant::Value(JavaConstant::Primitive(value)) => value,
        other => panic!("expected a primitive, got {other:?}"),
    }
}

// ============================================================================
// Plain entries
// ============================================================================

#[test]
fn test_primitive_constants() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    assert_eq!(primitive(pool.lookup_constant(demo.int).unwrap()), PrimitiveConstant::Int(42));
    assert_eq!(
        primitive(pool.lookup_constant(demo.long).unwrap()),
        PrimitiveConstant::Long(-1 << 40)
    );
    assert_eq!(
        primitive(pool.lookup_constant(demo.float).unwrap()),
        PrimitiveConstant::Float(1.5)
    );
    assert_eq!(
        primitive(pool.lookup_constant(demo.double).unwrap()),
        PrimitiveConstant::Double(-0.25)
    );
    assert_eq!(pool.int_at(demo.int).unwrap(), 42);
    assert_eq!(pool.long_at(demo.long).unwrap(), -1 << 40);
}

#[test]
fn test_tags_and_bounds() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    assert_eq!(pool.tag_at(0).unwrap(), None);
    assert_eq!(pool.tag_at(demo.long + 1).unwrap(), None);
    assert_eq!(pool.tag_at(demo.text).unwrap(), Some(JvmConstant::Utf8));
    assert_eq!(pool.tag_at(demo.count_cpi).unwrap(), Some(JvmConstant::Fieldref));
    assert_eq!(pool.tag_at(demo.indy_cpi).unwrap(), Some(JvmConstant::InvokeDynamic));

    let length = pool.length().unwrap();
    assert!(matches!(
        pool.raw_tag_at(length),
        Err(VmciError::Metadata(MetadataError::IndexOutOfBounds { index, .. })) if index == length
    ));
    assert!(matches!(
        pool.int_at(demo.text),
        Err(VmciError::Metadata(MetadataError::UnexpectedTag { expected: "Integer", .. }))
    ));
    assert!(pool.lookup_constant(demo.text).is_err());
}

#[test]
fn test_utf8_and_signatures() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    assert_eq!(pool.lookup_utf8(demo.text).unwrap(), "hello");
    let signature = pool.lookup_signature(demo.descriptor).unwrap();
    assert_eq!(signature.parameter_count(false), 2);
    assert_eq!(signature.parameter_kind(0), Some(JavaKind::Int));
    assert_eq!(signature.return_kind(), JavaKind::Void);
    assert_eq!(pool.holder().unwrap().name().unwrap(), "Ldemo/Holder;");
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_class_entries() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    let resolved = pool.lookup_type(demo.target_class, None).unwrap();
    let again = pool.lookup_type(demo.target_class, Some(Opcode::New)).unwrap();
    match (&resolved, &again) {
        (JavaType::Resolved(a), JavaType::Resolved(b)) => {
            assert!(Arc::ptr_eq(a, b));
            assert_eq!(a.klass_pointer(), demo.target);
        }
        other => panic!("expected resolved types, got {other:?}"),
    }

    assert_eq!(
        pool.lookup_type(demo.missing_class, None).unwrap(),
        JavaType::Unresolved("Ldemo/Missing;".to_string())
    );
    match pool.lookup_constant(demo.missing_class).unwrap() {
        PoolConstant::Type(ty) => assert!(!ty.is_resolved()),
        other => panic!("expected a type, got {other:?}"),
    }
}

#[test]
fn test_referenced_types() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    let via_field = pool
        .lookup_referenced_type(demo.count_op, Opcode::GetField)
        .unwrap();
    assert_eq!(
        via_field.as_resolved().map(|ty| ty.klass_pointer()),
        Some(demo.target)
    );
    let via_new = pool
        .lookup_referenced_type(demo.target_class, Opcode::New)
        .unwrap();
    assert_eq!(via_new, via_field);
    assert!(matches!(
        pool.lookup_referenced_type(demo.indy_op, Opcode::InvokeDynamic),
        Err(VmciError::Metadata(MetadataError::UnexpectedOpcode(Opcode::InvokeDynamic)))
    ));
}

// ============================================================================
// Cache indices
// ============================================================================

#[test]
fn test_cache_index_conversions() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let pool = &demo.pool;

    let which = pool
        .raw_index_to_cache_index(demo.count_op, Opcode::GetField)
        .unwrap();
    assert_eq!(which, demo.count_op + CPCACHE_INDEX_TAG);
    assert_eq!(
        pool.cache_index_to_raw_index(which, Opcode::GetField).unwrap(),
        demo.count_op
    );
    assert_eq!(pool.remap_from_cache(which).unwrap(), demo.count_cpi);
    assert_eq!(pool.klass_ref_index_at(which).unwrap(), demo.target_class);
    assert_eq!(pool.lookup_name(which).unwrap(), "count");
    assert_eq!(pool.lookup_member_signature(which).unwrap(), "I");
    assert_eq!(
        pool.uncached_klass_ref_index_at(demo.count_cpi).unwrap(),
        demo.target_class
    );

    let indy = pool
        .raw_index_to_cache_index(demo.indy_op, Opcode::InvokeDynamic)
        .unwrap();
    assert_eq!(indy, demo.indy_op);
    assert_eq!(pool.lookup_name(indy).unwrap(), "apply");
    assert!(matches!(
        pool.raw_index_to_cache_index(3, Opcode::InvokeDynamic),
        Err(VmciError::Metadata(MetadataError::NotInvokedynamicIndex(3)))
    ));
}

#[test]
fn test_operand_decoded_with_wrong_opcode_misses() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    assert!(demo
        .pool
        .lookup_method(demo.indy_op, Opcode::InvokeVirtual)
        .is_err());
}

// ============================================================================
// Members
// ============================================================================

#[test]
fn test_linked_field() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    let field = demo
        .pool
        .lookup_field(demo.count_op, None, Opcode::GetStatic)
        .unwrap();
    let resolved = field.as_resolved().expect("linked field");
    assert_eq!(resolved.name(), "count");
    assert_eq!(resolved.offset(), 24);
    assert_eq!(resolved.index(), 3);
    assert!(resolved.is_static());
    assert_eq!(resolved.holder().klass_pointer(), demo.target);
    assert_eq!(*resolved.field_type(), JavaType::Primitive(JavaKind::Int));
}

#[test]
fn test_unlinked_fields_stay_unresolved() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    match demo
        .pool
        .lookup_field(demo.unlinked_op, None, Opcode::GetField)
        .unwrap()
    {
        JavaField::Unresolved {
            holder,
            name,
            field_type,
        } => {
            assert!(holder.is_resolved());
            assert_eq!(name, "other");
            assert_eq!(field_type, JavaType::Primitive(JavaKind::Long));
        }
        other => panic!("expected an unresolved field, got {other:?}"),
    }

    match demo
        .pool
        .lookup_field(demo.gone_op, None, Opcode::PutField)
        .unwrap()
    {
        JavaField::Unresolved {
            holder, field_type, ..
        } => {
            assert_eq!(holder, JavaType::Unresolved("Ldemo/Missing;".to_string()));
            assert_eq!(
                field_type,
                JavaType::Unresolved("Ljava/lang/String;".to_string())
            );
        }
        other => panic!("expected an unresolved field, got {other:?}"),
    }
}

#[test]
fn test_linked_method_is_shared() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    let method = demo
        .pool
        .lookup_method(demo.compute_op, Opcode::InvokeStatic)
        .unwrap();
    let resolved = method.as_resolved().expect("linked method");
    assert_eq!(resolved.method_pointer(), demo.compute);
    assert_eq!(resolved.name().unwrap(), "compute");
    assert_eq!(resolved.holder().klass_pointer(), demo.target);
    assert!(Arc::ptr_eq(
        resolved,
        &fx.runtime.resolve_method(demo.compute).unwrap()
    ));
    assert_eq!(
        demo.pool.remap_from_cache(demo.compute_op + CPCACHE_INDEX_TAG).unwrap(),
        demo.compute_cpi
    );
}

#[test]
fn test_unlinked_methods() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    match demo
        .pool
        .lookup_method(demo.vanish_op, Opcode::InvokeVirtual)
        .unwrap()
    {
        JavaMethod::Unresolved {
            holder,
            name,
            signature,
        } => {
            assert_eq!(holder, JavaType::Unresolved("Ldemo/Missing;".to_string()));
            assert_eq!(name, "vanish");
            assert_eq!(signature.descriptor(), "()V");
        }
        other => panic!("expected an unresolved method, got {other:?}"),
    }

    match demo
        .pool
        .lookup_method(demo.indy_op, Opcode::InvokeDynamic)
        .unwrap()
    {
        JavaMethod::Unresolved { holder, name, .. } => {
            assert_eq!(holder.name().unwrap(), "Ljava/lang/invoke/MethodHandle;");
            assert_eq!(name, "apply");
        }
        other => panic!("expected an unresolved call site, got {other:?}"),
    }
}

#[test]
fn test_appendix() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let handle = fx.vm.new_global_handle(Arc::new("appendix".to_string()));
    fx.vm
        .set_appendix(
            demo.pool_address,
            demo.indy_cpi,
            RawConstant::Object(RawObject::Handle {
                handle,
                compressed: false,
            }),
        )
        .unwrap();

    let appendix = demo
        .pool
        .lookup_appendix(demo.indy_op, Opcode::InvokeDynamic)
        .unwrap()
        .expect("appendix");
    assert!(appendix.as_object().is_some());
    assert!(demo
        .pool
        .lookup_appendix(demo.compute_op, Opcode::InvokeStatic)
        .unwrap()
        .is_none());
}

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_referenced_type_initializes_on_request() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    demo.pool
        .load_referenced_type(demo.lazy_op, Opcode::GetStatic, true)
        .unwrap();
    assert_eq!(fx.vm.init_requests(), vec![demo.lazy]);

    // The class entry is resolved now, so nothing is loaded twice.
    demo.pool
        .load_referenced_type(demo.lazy_op, Opcode::GetStatic, true)
        .unwrap();
    assert_eq!(fx.vm.init_requests(), vec![demo.lazy]);
    let lazy_class = demo.pool.klass_ref_index_at(demo.lazy_op + CPCACHE_INDEX_TAG).unwrap();
    assert_eq!(demo.pool.tag_at(lazy_class).unwrap(), Some(JvmConstant::Class));
}

#[test]
fn test_load_referenced_type_without_initialization() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    demo.pool
        .load_referenced_type(demo.lazy_op, Opcode::PutStatic, false)
        .unwrap();
    assert!(fx.vm.init_requests().is_empty());
    let lazy = fx.runtime.resolve_type(demo.lazy).unwrap();
    assert!(!lazy.is_initialized().unwrap());

    demo.pool
        .load_referenced_type(demo.missing_class, Opcode::New, false)
        .unwrap();
    assert!(demo
        .pool
        .load_referenced_type(demo.vanish_op, Opcode::InvokeVirtual, false)
        .is_err());
}

#[test]
fn test_signature_polymorphic_call_sites_are_linked() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    demo.pool
        .load_referenced_type(demo.invoke_exact_op, Opcode::InvokeVirtual, false)
        .unwrap();
    assert_eq!(
        fx.vm.invoke_handle_resolutions(),
        vec![(demo.pool_address, demo.invoke_exact_op + CPCACHE_INDEX_TAG)]
    );
}

#[test]
fn test_invokedynamic_call_sites_are_linked() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);

    demo.pool
        .load_referenced_type(demo.indy_op, Opcode::InvokeDynamic, false)
        .unwrap();
    assert_eq!(
        fx.vm.invoke_dynamic_resolutions(),
        vec![(demo.pool_address, demo.indy_op)]
    );
    assert!(fx.vm.invoke_handle_resolutions().is_empty());
}

#[test]
fn test_pool_wrappers_are_shared_while_alive() {
    let fx = Fixture::new();
    let demo = demo_pool(&fx);
    let again = fx.runtime.constant_pool(demo.pool_address).unwrap();
    assert!(Arc::ptr_eq(&demo.pool, &again));
    assert_eq!(demo.pool.holder().unwrap().constant_pool().unwrap(), again);
}
