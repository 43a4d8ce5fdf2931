use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Computes the outer product `u ⊗ v`, a `(u.len(), v.len())` matrix.
pub fn outer(u: ArrayView1<f64>, v: ArrayView1<f64>) -> Array2<f64> {
    let column = u.insert_axis(Axis(1));
    let row = v.insert_axis(Axis(0));
    column.dot(&row)
}

/// Returns `count` evenly spaced values over `[start, stop]`, each rounded to
/// three decimal places.
pub fn rounded_linspace(start: f64, stop: f64, count: usize) -> Array1<f64> {
    if count == 1 {
        return Array1::from_elem(1, round3(start));
    }
    let step = (stop - start) / (count as f64 - 1.0);
    Array1::from_iter((0..count).map(|i| round3(start + step * i as f64)))
}

/// The sign of `x`: `-1`, `1`, or `0` for zero (unlike `f64::signum`).
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    #[test]
    fn outer_product() {
        let a = arr1(&[1.0, 2.0, 3.0]);
        let b = arr1(&[1.0, -1.0]);
        assert_eq!(
            outer(a.view(), b.view()),
            arr2(&[[1.0, -1.0], [2.0, -2.0], [3.0, -3.0]])
        );
    }

    #[test]
    fn linspace() {
        assert_eq!(rounded_linspace(-1.0, 1.0, 3), arr1(&[-1.0, 0.0, 1.0]));
        assert_eq!(rounded_linspace(-1.0, 1.0, 1), arr1(&[-1.0]));
        assert_eq!(
            rounded_linspace(-1.0, 1.0, 4),
            arr1(&[-1.0, -0.333, 0.333, 1.0])
        );
        assert_eq!(rounded_linspace(0.0, 1.0, 0).len(), 0);
    }

    #[test]
    fn signs() {
        assert_eq!(sign(-3.0), -1.0);
        assert_eq!(sign(0.0), 0.0);
        assert_eq!(sign(2.5), 1.0);
    }
}
