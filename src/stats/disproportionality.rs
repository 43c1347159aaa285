use crate::models::signal::MethodDetails;
use crate::stats::MethodOutput;

/// The 2x2 contingency table disproportionality analysis is built on:
/// `a` = entity events with the outcome of interest (e.g. deaths), `b` =
/// entity events without it, `c`/`d` the same split for the comparison
/// population.
#[derive(Debug, Clone, Copy)]
pub struct ContingencyTable {
    pub a: u64,
    pub b: u64,
    pub c: u64,
    pub d: u64,
}

const Z_95: f64 = 1.959963984540054;
/// Standard normal 5th-percentile quantile, used by the Wilson-Hilferty
/// gamma approximation in [`ebgm`].
const Z_05: f64 = -1.6448536269514722;

/// Proportional Reporting Ratio with a log-normal 95% CI.
pub fn prr(t: ContingencyTable) -> MethodOutput {
    let ContingencyTable { a, b, c, d } = t;
    let details = MethodDetails::Prr { a, b, c, d };

    if a + b == 0 || c + d == 0 || a == 0 || c == 0 {
        return MethodOutput { value: None, lower_ci: None, upper_ci: None, details };
    }

    let af = a as f64;
    let bf = b as f64;
    let cf = c as f64;
    let df = d as f64;

    let value = (af / (af + bf)) / (cf / (cf + df));
    let var_ln = 1.0 / af - 1.0 / (af + bf) + 1.0 / cf - 1.0 / (cf + df);
    let (lower_ci, upper_ci) = log_normal_ci(value, var_ln);

    MethodOutput { value: Some(value), lower_ci: Some(lower_ci), upper_ci: Some(upper_ci), details }
}

/// Reporting Odds Ratio with a log-normal 95% CI. Undefined (null) if any
/// cell of the table is zero.
pub fn ror(t: ContingencyTable) -> MethodOutput {
    let ContingencyTable { a, b, c, d } = t;
    let details = MethodDetails::Ror { a, b, c, d };

    if a == 0 || b == 0 || c == 0 || d == 0 {
        return MethodOutput { value: None, lower_ci: None, upper_ci: None, details };
    }

    let af = a as f64;
    let bf = b as f64;
    let cf = c as f64;
    let df = d as f64;

    let value = (af * df) / (bf * cf);
    let var_ln = 1.0 / af + 1.0 / bf + 1.0 / cf + 1.0 / df;
    let (lower_ci, upper_ci) = log_normal_ci(value, var_ln);

    MethodOutput { value: Some(value), lower_ci: Some(lower_ci), upper_ci: Some(upper_ci), details }
}

/// Simplified Empirical Bayes Geometric Mean (EBGM) — a shrunk point
/// estimate plus a gamma-approximated 5th-percentile lower bound (`EB05`),
/// reported via `lower_ci`. A documented simplification, not a full
/// Bayesian gamma-Poisson fit.
pub fn ebgm(t: ContingencyTable) -> MethodOutput {
    let ContingencyTable { a, b, c, d } = t;
    let total = a + b + c + d;
    let details_base = |expected: f64, rr: f64| MethodDetails::Ebgm { observed: a, expected, rr };

    if total == 0 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: details_base(0.0, 0.0),
        };
    }

    let af = a as f64;
    let expected = ((a + b) as f64 * (a + c) as f64) / total as f64;
    if expected == 0.0 {
        return MethodOutput {
            value: None,
            lower_ci: None,
            upper_ci: None,
            details: details_base(0.0, 0.0),
        };
    }

    let value = (af + 0.5) / (expected + 0.5);
    let rr = af / expected;
    let eb05 = gamma_quantile_05(af + 0.5, expected + 0.5);

    MethodOutput {
        value: Some(value),
        lower_ci: Some(eb05),
        upper_ci: None,
        details: details_base(expected, rr),
    }
}

fn log_normal_ci(point_estimate: f64, var_ln: f64) -> (f64, f64) {
    if point_estimate <= 0.0 || var_ln < 0.0 {
        return (0.0, 0.0);
    }
    let ln_est = point_estimate.ln();
    let se = var_ln.sqrt();
    ((ln_est - Z_95 * se).exp(), (ln_est + Z_95 * se).exp())
}

/// Wilson-Hilferty cube-root normal approximation of the gamma distribution
/// quantile function, evaluated at the 5th percentile.
fn gamma_quantile_05(shape: f64, rate: f64) -> f64 {
    if shape <= 0.0 || rate <= 0.0 {
        return 0.0;
    }
    let term = 1.0 - 1.0 / (9.0 * shape) + Z_05 * (1.0 / (9.0 * shape)).sqrt();
    let x = shape * term.powi(3);
    (x / rate).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn prr_below_minimum_a_still_computes_a_value() {
        // a < min_a doesn't make the value null, just not a signal
        // (that gate lives in the classifier, not here).
        let t = ContingencyTable { a: 2, b: 100, c: 50, d: 10000 };
        let out = prr(t);
        assert!(out.value.is_some());
    }

    #[test]
    fn prr_zero_a_is_undefined() {
        let t = ContingencyTable { a: 0, b: 100, c: 50, d: 10000 };
        let out = prr(t);
        assert_eq!(out.value, None);
    }

    #[test]
    fn prr_elevated_rate_yields_high_ratio() {
        let t = ContingencyTable { a: 30, b: 70, c: 10, d: 9990 };
        let out = prr(t).value.unwrap();
        assert!(out > 20.0);
    }

    #[test]
    fn ror_undefined_on_zero_cell() {
        let t = ContingencyTable { a: 5, b: 0, c: 10, d: 20 };
        let out = ror(t);
        assert_eq!(out.value, None);
    }

    #[test]
    fn ror_matches_hand_computation() {
        let t = ContingencyTable { a: 10, b: 90, c: 5, d: 995 };
        let out = ror(t);
        assert_relative_eq!(out.value.unwrap(), (10.0 * 995.0) / (90.0 * 5.0), epsilon = 1e-9);
    }

    #[test]
    fn ebgm_with_no_excess_events_is_near_one() {
        let t = ContingencyTable { a: 10, b: 990, c: 100, d: 9900 };
        let out = ebgm(t);
        let value = out.value.unwrap();
        assert_relative_eq!(value, 1.0, epsilon = 0.2);
    }

    #[test]
    fn ebgm_eb05_is_below_point_estimate() {
        let t = ContingencyTable { a: 50, b: 50, c: 10, d: 9990 };
        let out = ebgm(t);
        assert!(out.lower_ci.unwrap() < out.value.unwrap());
    }
}
