//! Known local subring zeta functions, for cross-checking.
//!
//! Closed forms for the local zeta function counting finite-index
//! unital subrings of `Z^n` are published for `n <= 4`: the rank 2 and
//! 3 cases go back to Liu (J. Combin. Theory Ser. A 114, 2007), the
//! rank 4 case to Atanasov, Kaplan, Krakoff and Menzel
//! (arXiv:1609.06433). A pipeline run over a resolution of the
//! corresponding singularity should reproduce these exactly, at every
//! prime, so they make sharp end-to-end oracles.

use num_rational::BigRational;

use crate::symbolic::{Poly, RatFn};
use crate::{field_var, twist_var};

/// The local zeta function of unital subrings of `Z^n`, when known.
///
/// Returns `None` for ranks where no closed form is published. The
/// rank 1 case is the constant `1`.
pub fn reference_zeta(n: usize) -> Option<RatFn> {
    let p = Poly::var(field_var());
    let t = Poly::var(twist_var());
    let one = Poly::one();
    let c = |k: i64| Poly::constant(BigRational::from_integer(k.into()));
    match n {
        1 => Some(RatFn::one()),
        2 => RatFn::new(one.clone(), one.clone() - t.clone()).ok(),
        3 => {
            let num = (one.clone() - t.pow(2)).pow(2);
            let den = (one.clone() - t.clone()).pow(3) * (one.clone() - p.clone() * t.pow(3));
            RatFn::new(num, den).ok()
        }
        4 => {
            let num = one.clone()
                + c(4) * t.clone()
                + c(2) * t.pow(2)
                + (c(4) * p.clone() - c(3)) * t.pow(3)
                + (c(5) * p.clone() - c(1)) * t.pow(4)
                + (p.pow(2) - c(5) * p.clone()) * t.pow(5)
                + (c(3) * p.pow(2) - c(4) * p.clone()) * t.pow(6)
                - c(2) * p.pow(2) * t.pow(7)
                - c(4) * p.pow(2) * t.pow(8)
                - p.pow(2) * t.pow(9);
            let den = (one.clone() - t.clone()).pow(2)
                * (one.clone() - p.pow(2) * t.pow(4))
                * (one - p.pow(3) * t.pow(6));
            RatFn::new(num, den).ok()
        }
        _ => None,
    }
}

/// Whether `candidate` equals the known form for `Z^n`, by
/// cross-multiplication. `None` when no reference is known.
pub fn matches_reference(candidate: &RatFn, n: usize) -> Option<bool> {
    reference_zeta(n).map(|zeta| zeta.equivalent(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse_expr;

    fn ratio(num: &str, den: &str) -> RatFn {
        RatFn::new(parse_expr(num).unwrap(), parse_expr(den).unwrap()).unwrap()
    }

    #[test]
    fn test_rank_two_is_the_geometric_series() {
        let zeta = reference_zeta(2).unwrap();
        assert!(zeta.equivalent(&ratio("1", "1 - t")));
    }

    #[test]
    fn test_rank_three_cancels_the_shared_factor() {
        let zeta = reference_zeta(3).unwrap();
        let reduced = ratio("(1 + t)^2", "(1 - t)*(1 - p*t^3)");
        assert!(zeta.equivalent(&reduced));
    }

    #[test]
    fn test_rank_four_constant_term_is_one() {
        let zeta = reference_zeta(4).unwrap();
        let constant = zeta.numerator().constant_term() / zeta.denominator().constant_term();
        assert!(constant.is_integer());
        assert_eq!(constant.to_integer(), 1.into());
    }

    #[test]
    fn test_matches_reference_detects_mismatch() {
        let two = reference_zeta(2).unwrap();
        assert_eq!(matches_reference(&two, 3), Some(false));
        assert_eq!(matches_reference(&two, 2), Some(true));
    }

    #[test]
    fn test_matches_reference_unknown_rank() {
        assert_eq!(matches_reference(&RatFn::one(), 7), None);
    }
}
