//! Software reference model.
//!
//! Recomputes the accelerator's fixed-point arithmetic on the host:
//! 32-bit signed dot product, arithmetic right shift, then clamp to
//! [-128, 127]. The shift is sign-preserving and clamping always happens
//! after it, never before — the hardware pipeline does the same, and the
//! validation suite holds the two to bit-for-bit equality.

/// Expected shifted/clamped output for a single row.
#[must_use]
pub fn expected_row(weights: &[i8], acts: &[i8], shift: u32) -> i8 {
    let acc = raw_row(weights, acts);
    // i32 >> is an arithmetic shift; clamp after shifting.
    let shifted = acc >> shift;
    #[allow(clippy::cast_possible_truncation)]
    {
        shifted.clamp(-128, 127) as i8
    }
}

/// Raw 32-bit accumulator for a single row (no shift, no clamp).
#[must_use]
pub fn raw_row(weights: &[i8], acts: &[i8]) -> i32 {
    weights
        .iter()
        .zip(acts)
        .map(|(&w, &a)| i32::from(w) * i32::from(a))
        .sum()
}

/// Expected shifted/clamped outputs for all M rows of a row-major matrix.
#[must_use]
pub fn expected_matvec(weights: &[i8], acts: &[i8], m: usize, k: usize, shift: u32) -> Vec<i8> {
    (0..m)
        .map(|row| expected_row(&weights[row * k..(row + 1) * k], acts, shift))
        .collect()
}

/// Raw accumulators for all M rows.
#[must_use]
pub fn raw_matvec(weights: &[i8], acts: &[i8], m: usize, k: usize) -> Vec<i32> {
    (0..m)
        .map(|row| raw_row(&weights[row * k..(row + 1) * k], acts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_clamp() {
        // 127 and -128 pass through unclamped; 128 -> 127; -192 -> -128.
        let plus = [1i8; 64];
        let minus = [-1i8; 64];

        let mut acts = [2i8; 64];
        acts[63] = 1; // acc = 127
        assert_eq!(expected_row(&plus, &acts, 0), 127);

        let acts = [2i8; 64]; // acc = 128
        assert_eq!(expected_row(&plus, &acts, 0), 127);

        let acts = [2i8; 64]; // acc = -128
        assert_eq!(expected_row(&minus, &acts, 0), -128);

        let acts = [3i8; 64]; // acc = -192
        assert_eq!(expected_row(&minus, &acts, 0), -128);
    }

    #[test]
    fn shift_is_arithmetic() {
        // -64 >> 1 must stay negative (-32), not wrap.
        let w = [-1i8; 64];
        let a = [1i8; 64];
        assert_eq!(expected_row(&w, &a, 1), -32);
        // C-style arithmetic shift rounds toward negative infinity: -1 >> 1 = -1.
        let mut w1 = [0i8; 64];
        w1[0] = -1;
        let mut a1 = [0i8; 64];
        a1[0] = 1;
        assert_eq!(expected_row(&w1, &a1, 1), -1);
    }

    #[test]
    fn clamp_happens_after_shift() {
        // acc = 256 with shift 1 -> 128 -> clamp 127; clamping first would give 63.
        let w = [1i8; 64];
        let a = [4i8; 64];
        assert_eq!(expected_row(&w, &a, 1), 127);
        // and with shift 2 the value fits: 256 >> 2 = 64
        assert_eq!(expected_row(&w, &a, 2), 64);
    }

    #[test]
    fn shift_sweep_on_fixed_accumulator() {
        let w = [1i8; 64];
        let a = [1i8; 64]; // acc = 64
        for shift in 0..=9 {
            assert_eq!(expected_row(&w, &a, shift), (64i32 >> shift) as i8);
        }
    }

    #[test]
    fn matvec_rows_are_independent() {
        let k = 64;
        let mut weights = vec![0i8; 3 * k];
        weights[..k].fill(1);
        weights[2 * k..].fill(-1);
        let acts = vec![2i8; k];
        assert_eq!(expected_matvec(&weights, &acts, 3, k, 0), vec![127, 0, -128]);
        assert_eq!(raw_matvec(&weights, &acts, 3, k), vec![128, 0, -128]);
    }
}
