//! Vector type aliases and architecture bindings.
//!
//! On x86_64 `__m128i` is the native SSE register type. On aarch64 we wrap
//! NEON's `uint8x16_t` in a transparent newtype and provide reinterpret
//! helpers for the element widths the kernels touch. All helpers are plain
//! bitcasts; no lanes move.

#[cfg(target_arch = "x86_64")]
pub(crate) use std::arch::x86_64 as simd_arch;

#[cfg(target_arch = "aarch64")]
pub(crate) use std::arch::aarch64 as simd_arch;

/// Type alias for `__m128i` on x86_64.
#[allow(non_camel_case_types)]
#[cfg(target_arch = "x86_64")]
pub type __m128i = simd_arch::__m128i;

/// Transparent `__m128i` wrapper on aarch64 (NEON), backed by `uint8x16_t`.
#[allow(non_camel_case_types)]
#[cfg(target_arch = "aarch64")]
#[derive(Copy, Clone)]
#[repr(transparent)]
pub struct __m128i(pub simd_arch::uint8x16_t);

#[cfg(target_arch = "aarch64")]
impl __m128i {
    /// View as signed 16-bit lanes.
    #[inline]
    pub fn as_s16(self) -> simd_arch::int16x8_t {
        unsafe { simd_arch::vreinterpretq_s16_u8(self.0) }
    }

    /// Construct from signed 16-bit lanes by reinterpretation.
    #[inline]
    pub fn from_s16(v: simd_arch::int16x8_t) -> Self {
        Self(unsafe { simd_arch::vreinterpretq_u8_s16(v) })
    }

    /// View as unsigned 16-bit lanes.
    #[inline]
    pub fn as_u16(self) -> simd_arch::uint16x8_t {
        unsafe { simd_arch::vreinterpretq_u16_u8(self.0) }
    }

    /// Construct from unsigned 16-bit lanes by reinterpretation.
    #[inline]
    pub fn from_u16(v: simd_arch::uint16x8_t) -> Self {
        Self(unsafe { simd_arch::vreinterpretq_u8_u16(v) })
    }
}
