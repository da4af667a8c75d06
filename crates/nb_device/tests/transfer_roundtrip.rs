// crates/nb_device/tests/transfer_roundtrip.rs

//! Cross-device transfer and ownership properties.

use glam::Vec3;
use nb_device::prelude::*;
use nb_foundation::ElementType;

#[test]
fn host_accel_host_roundtrip_preserves_contents() {
    let ctx = DeviceContext::new();
    let accel = ctx.accel_device();

    let data: Vec<f32> = (0..64).map(|i| i as f32 * 0.5).collect();
    let host = NdArray::from_slice(&ctx, &data, Device::Host).unwrap();

    let on_accel = host.to(accel).unwrap();
    assert_eq!(on_accel.device(), accel);
    assert_eq!(on_accel.len(), 64);

    let back = on_accel.to(Device::Host).unwrap();
    assert_eq!(back.device(), Device::Host);
    assert_eq!(back.as_slice::<f32>().unwrap(), data.as_slice());
}

#[test]
fn to_accel_produces_no_alias() {
    let ctx = DeviceContext::new();
    let host = NdArray::from_slice(&ctx, &[1.0f32, 2.0, 3.0], Device::Host).unwrap();
    let host_addr = host.addr();
    let on_accel = host.to(ctx.accel_device()).unwrap();
    assert_ne!(on_accel.addr(), host_addr);
    assert_eq!(on_accel.element_type(), ElementType::Float32);
}

#[test]
fn owning_array_frees_exactly_once_with_original_capacity() {
    let ctx = DeviceContext::new();
    let before = ctx.host_stats();
    {
        let arr = NdArray::zeros(&ctx, 10, ElementType::Vec3, Device::Host).unwrap();
        assert_eq!(arr.capacity_bytes(), 120);
    }
    let after = ctx.host_stats();
    assert_eq!(after.allocs - before.allocs, 1);
    assert_eq!(after.frees - before.frees, 1);
    assert_eq!(after.freed_bytes - before.freed_bytes, 120);
    assert_eq!(after.live_bytes, before.live_bytes);
}

#[test]
fn views_never_trigger_a_free() {
    let ctx = DeviceContext::new();
    let arr = NdArray::zeros(&ctx, 12, ElementType::Float32, Device::Host).unwrap();
    let frees_before = ctx.host_stats().frees;
    {
        let view = arr.reinterpret(ElementType::Vec3).unwrap();
        assert_eq!(view.len(), 4);
        let wrap_data = [1.0f32, 2.0, 3.0];
        let wrap = HostArrayRef::new(&wrap_data);
        assert_eq!(wrap.len(), 3);
    }
    // Dropping both view kinds released nothing.
    assert_eq!(ctx.host_stats().frees, frees_before);
    drop(arr);
    assert_eq!(ctx.host_stats().frees, frees_before + 1);
}

#[test]
fn zero_clears_full_extent_on_host_readback() {
    let ctx = DeviceContext::new();
    let data = [0xFFFFFFFFu32; 30];
    let mut arr = NdArray::from_slice(&ctx, &data, Device::Host).unwrap();
    arr.zero();
    assert!(arr.as_slice::<u32>().unwrap().iter().all(|&x| x == 0));
}

#[test]
fn zero_transfer_zero_transfer_scenario() {
    // Allocate 10 x vec3 on the host, zero, move to the accelerator, zero
    // through the accelerator path, move back: ten (0,0,0) vectors.
    let ctx = DeviceContext::new();
    let accel = ctx.accel_device();

    let mut host = NdArray::from_scalars(
        &ctx,
        &(1..=30).map(|i| i as f32).collect::<Vec<_>>(),
        ElementType::Vec3,
        Device::Host,
    )
    .unwrap();
    assert_eq!(host.len(), 10);
    host.zero();

    let mut on_accel = host.to(accel).unwrap();
    on_accel.zero();

    let back = on_accel.to(Device::Host).unwrap();
    let vectors = back.as_slice::<Vec3>().unwrap();
    assert_eq!(vectors.len(), 10);
    assert!(vectors.iter().all(|&v| v == Vec3::ZERO));
}

#[test]
fn reinterpret_view_reads_through_source_memory() {
    let ctx = DeviceContext::new();
    let arr = NdArray::from_slice(
        &ctx,
        &[Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0)],
        Device::Host,
    )
    .unwrap();
    let view = arr.reinterpret(ElementType::Float32).unwrap();
    assert_eq!(view.len(), 6);
    assert_eq!(
        view.as_slice::<f32>().unwrap(),
        &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    );
}

#[test]
fn accel_array_readback_via_host_vec() {
    let ctx = DeviceContext::new();
    let on_accel =
        NdArray::from_slice(&ctx, &[7i64, 8, 9], ctx.accel_device()).unwrap();
    assert_eq!(on_accel.to_host_vec::<i64>().unwrap(), vec![7, 8, 9]);
}

#[test]
fn allocation_failure_leaves_no_partial_state() {
    let ctx = DeviceContext::new();
    let live_before = ctx.host_stats().live_bytes;
    // Far beyond any plausible allocation; the backend reports failure
    // instead of aborting.
    let result = NdArray::zeros(&ctx, usize::MAX / 16, ElementType::Float64, Device::Host);
    assert!(matches!(
        result,
        Err(NbError::AllocationFailure { .. })
    ));
    assert_eq!(ctx.host_stats().live_bytes, live_before);
}
