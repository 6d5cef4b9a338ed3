//! Portable helpers mirroring the subset of x86 SSE2-class intrinsics the
//! striped kernels use.
//!
//! Each function maps to the native intrinsic on x86_64 and to the equivalent
//! NEON operation (or a small scalar fallback) on aarch64. The variable byte
//! shift accepts a runtime `num_bytes` and is implemented with a match table
//! on x86, where the underlying instruction requires an immediate; shifts by
//! 16 or more bytes yield zeros, consistent with x86 semantics.
//!
//! All functions are `unsafe` for the same reasons as the underlying
//! intrinsics (pointer validity for loads/stores, ISA availability).

#![allow(unsafe_op_in_unsafe_fn)]

use super::types::{__m128i, simd_arch};

#[inline]
pub unsafe fn _mm_setzero_si128() -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_setzero_si128()
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vdupq_n_u8(0))
    }
}

#[inline]
pub unsafe fn _mm_set1_epi8(a: i8) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_set1_epi8(a)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vdupq_n_u8(a as u8))
    }
}

#[inline]
pub unsafe fn _mm_set1_epi16(a: i16) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_set1_epi16(a)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i::from_s16(simd_arch::vdupq_n_s16(a))
    }
}

#[inline]
pub unsafe fn _mm_load_si128(p: *const __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_load_si128(p)
    }
    #[cfg(target_arch = "aarch64")]
    {
        *p
    }
}

#[inline]
pub unsafe fn _mm_store_si128(p: *mut __m128i, a: __m128i) {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_store_si128(p, a)
    }
    #[cfg(target_arch = "aarch64")]
    {
        *p = a;
    }
}

#[inline]
pub unsafe fn _mm_loadu_si128(p: *const __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_loadu_si128(p)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vld1q_u8(p as *const u8))
    }
}

#[inline]
pub unsafe fn _mm_storeu_si128(p: *mut __m128i, a: __m128i) {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_storeu_si128(p, a)
    }
    #[cfg(target_arch = "aarch64")]
    {
        simd_arch::vst1q_u8(p as *mut u8, a.0)
    }
}

#[inline]
pub unsafe fn _mm_adds_epu8(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_adds_epu8(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vqaddq_u8(a.0, b.0))
    }
}

#[inline]
pub unsafe fn _mm_subs_epu8(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_subs_epu8(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vqsubq_u8(a.0, b.0))
    }
}

#[inline]
pub unsafe fn _mm_max_epu8(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_max_epu8(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vmaxq_u8(a.0, b.0))
    }
}

#[inline]
pub unsafe fn _mm_adds_epu16(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_adds_epu16(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i::from_u16(simd_arch::vqaddq_u16(a.as_u16(), b.as_u16()))
    }
}

#[inline]
pub unsafe fn _mm_subs_epu16(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_subs_epu16(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i::from_u16(simd_arch::vqsubq_u16(a.as_u16(), b.as_u16()))
    }
}

#[inline]
pub unsafe fn _mm_max_epu16(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_max_epu16(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i::from_u16(simd_arch::vmaxq_u16(a.as_u16(), b.as_u16()))
    }
}

#[inline]
pub unsafe fn _mm_cmpeq_epi8(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_cmpeq_epi8(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vceqq_u8(a.0, b.0))
    }
}

#[inline]
pub unsafe fn _mm_and_si128(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_and_si128(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vandq_u8(a.0, b.0))
    }
}

#[inline]
pub unsafe fn _mm_or_si128(a: __m128i, b: __m128i) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_or_si128(a, b)
    }
    #[cfg(target_arch = "aarch64")]
    {
        __m128i(simd_arch::vorrq_u8(a.0, b.0))
    }
}

/// Bit mask of the sign bits of the 16 byte lanes.
#[inline]
pub unsafe fn _mm_movemask_epi8(a: __m128i) -> i32 {
    #[cfg(target_arch = "x86_64")]
    {
        simd_arch::_mm_movemask_epi8(a)
    }
    #[cfg(target_arch = "aarch64")]
    {
        // NEON has no direct movemask; store and test sign bits.
        let mut tmp = [0i8; 16];
        _mm_storeu_si128(tmp.as_mut_ptr() as *mut __m128i, a);
        let mut res = 0;
        for (i, &b) in tmp.iter().enumerate() {
            if b < 0 {
                res |= 1 << i;
            }
        }
        res
    }
}

/// Shift the 128-bit vector left by `num_bytes` (toward higher lane indices).
#[inline]
pub unsafe fn _mm_slli_si128_var(a: __m128i, num_bytes: i32) -> __m128i {
    #[cfg(target_arch = "x86_64")]
    {
        // The underlying instruction takes a compile-time immediate.
        match num_bytes {
            0 => a,
            1 => simd_arch::_mm_slli_si128(a, 1),
            2 => simd_arch::_mm_slli_si128(a, 2),
            3 => simd_arch::_mm_slli_si128(a, 3),
            4 => simd_arch::_mm_slli_si128(a, 4),
            5 => simd_arch::_mm_slli_si128(a, 5),
            6 => simd_arch::_mm_slli_si128(a, 6),
            7 => simd_arch::_mm_slli_si128(a, 7),
            8 => simd_arch::_mm_slli_si128(a, 8),
            9 => simd_arch::_mm_slli_si128(a, 9),
            10 => simd_arch::_mm_slli_si128(a, 10),
            11 => simd_arch::_mm_slli_si128(a, 11),
            12 => simd_arch::_mm_slli_si128(a, 12),
            13 => simd_arch::_mm_slli_si128(a, 13),
            14 => simd_arch::_mm_slli_si128(a, 14),
            15 => simd_arch::_mm_slli_si128(a, 15),
            _ => _mm_setzero_si128(),
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if num_bytes >= 16 {
            _mm_setzero_si128()
        } else {
            // Extract a 16-byte window from (zero ++ a); the lane offset must
            // be a compile-time constant here as well.
            macro_rules! ext {
                ($n:literal) => {
                    __m128i(simd_arch::vextq_u8::<$n>(simd_arch::vdupq_n_u8(0), a.0))
                };
            }
            match num_bytes {
                0 => a,
                1 => ext!(15),
                2 => ext!(14),
                3 => ext!(13),
                4 => ext!(12),
                5 => ext!(11),
                6 => ext!(10),
                7 => ext!(9),
                8 => ext!(8),
                9 => ext!(7),
                10 => ext!(6),
                11 => ext!(5),
                12 => ext!(4),
                13 => ext!(3),
                14 => ext!(2),
                _ => ext!(1),
            }
        }
    }
}
