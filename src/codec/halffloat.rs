//! IEEE-754 half-precision conversion for 2-byte float fields.
//!
//! NaN values are widened and narrowed by bit manipulation rather than
//! hardware float casts: the casts set the quiet bit on signaling NaNs,
//! which would break byte-identical round trips.

/// Widen a half-precision bit pattern to f64.
pub(crate) fn f16_to_f64(bits: u16) -> f64 {
    let exp = (bits >> 10) & 0x1f;
    let frac = bits & 0x3ff;
    if exp == 0x1f && frac != 0 {
        let sign = (bits as u64 >> 15) << 63;
        return f64::from_bits(sign | (0x7ff << 52) | ((frac as u64) << 42));
    }
    f16_to_f32(bits) as f64
}

/// Narrow an f64 to a half-precision bit pattern, rounding to nearest even.
pub(crate) fn f64_to_f16(value: f64) -> u16 {
    let bits = value.to_bits();
    let exp = (bits >> 52) & 0x7ff;
    let frac = bits & 0xf_ffff_ffff_ffff;
    if exp == 0x7ff && frac != 0 {
        let sign = ((bits >> 48) & 0x8000) as u16;
        let payload = (frac >> 42) as u16 & 0x3ff;
        // A payload that truncates to zero would read back as infinity.
        return sign | 0x7c00 | if payload != 0 { payload } else { 0x200 };
    }
    f32_to_f16(value as f32)
}

/// Widen a half-precision bit pattern to f32.
fn f16_to_f32(bits: u16) -> f32 {
    let sign = (bits as u32 >> 15) << 31;
    let exp = (bits as u32 >> 10) & 0x1f;
    let frac = bits as u32 & 0x3ff;

    let out = if exp == 0 {
        if frac == 0 {
            sign
        } else {
            // Subnormal: renormalize into the f32 exponent range.
            let mut exp = 113u32;
            let mut frac = frac;
            while frac & 0x400 == 0 {
                frac <<= 1;
                exp -= 1;
            }
            sign | (exp << 23) | ((frac & 0x3ff) << 13)
        }
    } else if exp == 0x1f {
        sign | (0xff << 23) | (frac << 13)
    } else {
        sign | ((exp + 112) << 23) | (frac << 13)
    };
    f32::from_bits(out)
}

/// Narrow an f32 to a half-precision bit pattern, rounding to nearest even.
fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let frac = bits & 0x7f_ffff;

    if exp == 0xff {
        if frac == 0 {
            return sign | 0x7c00;
        }
        let payload = (frac >> 13) as u16 & 0x3ff;
        return sign | 0x7c00 | if payload != 0 { payload } else { 0x200 };
    }

    let unbiased = exp - 127;
    if unbiased >= 16 {
        return sign | 0x7c00;
    }
    if unbiased >= -14 {
        let mut half_exp = (unbiased + 15) as u32;
        let mut half_frac = frac >> 13;
        let round = frac & 0x1fff;
        if round > 0x1000 || (round == 0x1000 && half_frac & 1 == 1) {
            half_frac += 1;
            if half_frac == 0x400 {
                half_frac = 0;
                half_exp += 1;
                if half_exp >= 0x1f {
                    return sign | 0x7c00;
                }
            }
        }
        sign | ((half_exp as u16) << 10) | half_frac as u16
    } else if unbiased >= -24 {
        // Half subnormal range.
        let frac_full = frac | 0x80_0000;
        let shift = (-unbiased - 1) as u32;
        let mut half_frac = frac_full >> shift;
        let rem = frac_full & ((1 << shift) - 1);
        let halfway = 1u32 << (shift - 1);
        if rem > halfway || (rem == halfway && half_frac & 1 == 1) {
            half_frac += 1;
        }
        // A carry out of the subnormal range lands on the smallest normal
        // bit pattern, which is already correct.
        sign | half_frac as u16
    } else {
        sign
    }
}
