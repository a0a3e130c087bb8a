use statrs::statistics::Statistics;

const EPSILON: f64 = 1e-9;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().mean()
}

pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().population_std_dev()
}

pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.abs() < EPSILON {
        return 0.0;
    }
    std_dev(values) / m
}

pub fn ratio_or(numerator: f64, denominator: f64, fallback: f64) -> f64 {
    if denominator.abs() < EPSILON {
        fallback
    } else {
        numerator / denominator
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
    /// Plain (non-excess) kurtosis, 3 for a Gaussian.
    pub kurtosis: f64,
}

impl Moments {
    pub fn excess_kurtosis(&self) -> f64 {
        self.kurtosis - 3.0
    }
}

pub fn moments(values: &[f64]) -> Moments {
    let m = mean(values);
    let sd = std_dev(values);

    if sd < EPSILON {
        return Moments {
            mean: m,
            std_dev: sd,
            skewness: 0.0,
            kurtosis: 3.0,
        };
    }

    let n = values.len() as f64;
    let (m3, m4) = values.iter().fold((0.0, 0.0), |(m3, m4), &v| {
        let z = (v - m) / sd;
        let z2 = z * z;
        (m3 + z2 * z, m4 + z2 * z2)
    });

    Moments {
        mean: m,
        std_dev: sd,
        skewness: m3 / n,
        kurtosis: m4 / n,
    }
}

pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    let med = median(&mut sorted);

    let mut deviations = values.iter().map(|&v| (v - med).abs()).collect::<Vec<_>>();
    median(&mut deviations)
}

pub fn shannon_entropy(counts: &[u32]) -> f64 {
    let total = counts.iter().map(|&c| c as f64).sum::<f64>();
    if total <= 0.0 {
        return 0.0;
    }

    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

pub fn tail_means(values: &[f64], fraction: f64) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let k = ((sorted.len() as f64 * fraction) as usize).max(1);
    let low = mean(&sorted[..k]);
    let high = mean(&sorted[sorted.len() - k..]);

    (low, high)
}
