//! Compute layer: SIMD portability for the striped alignment kernels.
//!
//! The dynamic-programming kernels in `crate::alignment` are written against a
//! small set of portable 128-bit vector shims rather than raw `std::arch`
//! intrinsics, so the same kernel source serves SSE2-class x86_64 and NEON
//! aarch64. Lane width (8-bit vs 16-bit words inside the 128-bit register) is
//! a per-fill decision made by the caller, not a compile-time engine choice.

pub mod simd_abstraction;
