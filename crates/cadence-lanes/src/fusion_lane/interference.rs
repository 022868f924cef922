// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Agreement and divergence between stream energy series.

/// Tolerance under which two energy series are treated as identical.
const IDENTICAL_EPSILON: f64 = 1.0e-6;

/// Mean pairwise Pearson correlation of the given series, in `[-1, 1]`.
///
/// Each pair is compared over its aligned tail (the newest
/// `min(len_a, len_b)` values). A pair contributes `0` when it has fewer than
/// two aligned points, when either side has no variance, or when both sides
/// are identical; identical streams carry no information about agreement.
/// Fewer than two series yields `0`.
pub fn interference_score(series: &[&[f32]]) -> f32 {
    if series.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0f64;
    let mut pairs = 0usize;
    for (i, a) in series.iter().enumerate() {
        for b in &series[i + 1..] {
            total += pair_correlation(a, b);
            pairs += 1;
        }
    }

    ((total / pairs as f64) as f32).clamp(-1.0, 1.0)
}

fn pair_correlation(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];

    if a
        .iter()
        .zip(b)
        .all(|(x, y)| (f64::from(*x) - f64::from(*y)).abs() < IDENTICAL_EPSILON)
    {
        return 0.0;
    }

    let mean_a = a.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;
    let mean_b = b.iter().map(|&v| f64::from(v)).sum::<f64>() / n as f64;

    let (mut cov, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let dx = f64::from(x) - mean_a;
        let dy = f64::from(y) - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < f64::EPSILON {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}
