//! Scalars that fit in a single 64-bit atomic word.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A `Copy` scalar that can be stored in an [`AtomicCell`](super::AtomicCell).
///
/// The value is packed into a `u64` bit pattern. Round trips are lossless for
/// every type except where noted on the impl (durations and timestamps
/// saturate at the edges of the 64-bit range).
pub trait AtomicScalar: Copy {
    /// Packs the value into its bit pattern.
    fn into_bits(self) -> u64;

    /// Unpacks a bit pattern produced by [`AtomicScalar::into_bits`].
    fn from_bits(bits: u64) -> Self;
}

impl AtomicScalar for bool {
    #[inline(always)]
    fn into_bits(self) -> u64 {
        u64::from(self)
    }

    #[inline(always)]
    fn from_bits(bits: u64) -> Self {
        bits != 0
    }
}

macro_rules! unsigned_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl AtomicScalar for $ty {
            #[inline(always)]
            fn into_bits(self) -> u64 {
                self as u64
            }

            #[inline(always)]
            #[allow(clippy::cast_possible_truncation)]
            fn from_bits(bits: u64) -> Self {
                bits as $ty
            }
        }
    )*};
}

macro_rules! signed_scalar {
    ($($ty:ty),* $(,)?) => {$(
        impl AtomicScalar for $ty {
            #[inline(always)]
            #[allow(clippy::cast_sign_loss)]
            fn into_bits(self) -> u64 {
                i64::from(self) as u64
            }

            #[inline(always)]
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            fn from_bits(bits: u64) -> Self {
                bits as i64 as $ty
            }
        }
    )*};
}

unsigned_scalar!(u8, u16, u32, u64, usize);
signed_scalar!(i8, i16, i32, i64);

/// Stored as whole nanoseconds; durations longer than `u64::MAX` ns (~584 years) saturate.
impl AtomicScalar for Duration {
    #[inline]
    fn into_bits(self) -> u64 {
        u64::try_from(self.as_nanos()).unwrap_or(u64::MAX)
    }

    #[inline]
    fn from_bits(bits: u64) -> Self {
        Duration::from_nanos(bits)
    }
}

/// Stored as signed nanoseconds relative to [`UNIX_EPOCH`]; instants beyond
/// roughly ±292 years of the epoch saturate.
impl AtomicScalar for SystemTime {
    #[allow(clippy::cast_sign_loss)]
    fn into_bits(self) -> u64 {
        let nanos = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
            Err(before) => i64::try_from(before.duration().as_nanos())
                .map_or(i64::MIN, |n| -n),
        };
        nanos as u64
    }

    #[allow(clippy::cast_possible_wrap)]
    fn from_bits(bits: u64) -> Self {
        let nanos = bits as i64;
        if nanos >= 0 {
            UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs())
        } else {
            UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: AtomicScalar + PartialEq + core::fmt::Debug>(value: T) {
        assert_eq!(T::from_bits(value.into_bits()), value);
    }

    #[test]
    fn test_signed_values_keep_their_sign() {
        round_trip(-1i32);
        round_trip(i64::MIN);
        round_trip(i8::MIN);
        assert_eq!((-1i64).into_bits(), u64::MAX);
    }

    #[test]
    fn test_durations_saturate() {
        round_trip(Duration::from_millis(1500));
        assert_eq!(Duration::MAX.into_bits(), u64::MAX);
    }

    #[test]
    fn test_timestamps_before_the_epoch_survive() {
        let before = UNIX_EPOCH - Duration::from_secs(86_400);
        round_trip(before);
        round_trip(UNIX_EPOCH + Duration::from_nanos(1_234_567_891));
    }
}
