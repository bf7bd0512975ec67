use std::fs::File;
use std::io::{Result, Write};
use std::path::PathBuf;

// Lanczos approximation of ln Γ(x) for x > 0.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
        -0.0,
    ];
    if x < 0.5 {
        return std::f64::consts::PI.ln()
            - (std::f64::consts::PI * x).sin().ln()
            - ln_gamma(1.0 - x);
    }
    let z = x - 1.0;
    let mut sum = 0.999_999_999_999_809_9;
    for (i, c) in COEFFS.iter().enumerate() {
        sum += c / (z + (i as f64) + 1.0);
    }
    let t = z + COEFFS.len() as f64 - 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (z + 0.5) * t.ln() - t + sum.ln()
}

// Regularized lower incomplete gamma P(a, x).
fn regularized_lower_gamma(a: f64, x: f64) -> f64 {
    if x <= 0.0 || a <= 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        let mut ap = a;
        let mut sum = 1.0 / a;
        let mut del = sum;
        for _ in 0..500 {
            ap += 1.0;
            del *= x / ap;
            sum += del;
            if del.abs() < sum.abs() * 1e-15 {
                break;
            }
        }
        sum * (-x + a * x.ln() - ln_gamma(a)).exp()
    } else {
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / 1e-300;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..500 {
            let an = -(i as f64) * ((i as f64) - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < 1e-300 {
                d = 1e-300;
            }
            c = b + an / c;
            if c.abs() < 1e-300 {
                c = 1e-300;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < 1e-15 {
                break;
            }
        }
        1.0 - (-x + a * x.ln() - ln_gamma(a)).exp() * h
    }
}

fn chi_squared_cdf(dof: usize, x: f64) -> f64 {
    regularized_lower_gamma(dof as f64 / 2.0, x / 2.0)
}

// Bisects the CDF; it is monotone so 200 halvings reach f64 resolution.
fn chi_squared_quantile(dof: usize, confidence: f64) -> f64 {
    let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
    while chi_squared_cdf(dof, hi) < confidence {
        hi *= 2.0;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if chi_squared_cdf(dof, mid) < confidence {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

fn main() -> Result<()> {
    // Degrees of freedom of the identity (2), incidence (1) and residual (4)
    // tests, plus 3 for completeness.
    let dofs = [1_usize, 2, 3, 4];
    let confidences = [0.90_f64, 0.95, 0.975, 0.99, 0.999];

    let out_dir = PathBuf::from(
        std::env::var("OUT_DIR")
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e))?,
    );
    let dest = out_dir.join("chi2_quantiles.rs");
    let mut f = File::create(dest)?;

    writeln!(
        f,
        "// Auto-generated at build time: chi-squared quantiles.\n\
         // Entries are (degrees of freedom, confidence, quantile).\n\
         pub const CHI_SQUARED_QUANTILES: &[(usize, f64, f64)] = &["
    )?;
    for dof in dofs {
        for confidence in confidences {
            let q = chi_squared_quantile(dof, confidence);
            writeln!(f, "    ({dof}, {confidence:?}f64, {q:?}f64),")?;
        }
    }
    writeln!(f, "];")?;

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
