use serde::{Deserialize, Serialize};

use crate::stats::{weighted_mean, ErrorKind};

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
/// Criteria a contiguous run of heating steps must meet to be a plateau
pub struct PlateauOptions {
    /// Minimum number of non-omitted steps
    pub nsteps: usize,
    /// Minimum percentage of the total 39K released
    pub gas_fraction: f64,
    /// Every pair of steps must overlap at this many standard deviations
    pub overlap_sigma: f64,
    /// Step labels, for example `("B", "F")`, forcing the plateau range
    pub fixed_steps: Option<(String, String)>,
    pub plateau_age_error_kind: ErrorKind,
}

impl Default for PlateauOptions {
    fn default() -> Self {
        Self {
            nsteps: 3,
            gas_fraction: 50.0,
            overlap_sigma: 2.0,
            fixed_steps: None,
            plateau_age_error_kind: ErrorKind::Sem,
        }
    }
}

/// The label of the step at `index`: `A` to `Z`, then `AA`, `AB`, ...
#[must_use]
pub fn alpha_label(index: usize) -> String {
    let letter = |i: usize| char::from(ALPHABET[i % 26]);
    if index < 26 {
        letter(index).to_string()
    } else {
        let index = index - 26;
        format!("{}{}", letter(index / 26), letter(index))
    }
}

/// Inverse of `alpha_label`
#[must_use]
pub fn alpha_index(label: &str) -> Option<usize> {
    let position = |c: u8| ALPHABET.iter().position(|a| *a == c);
    match label.trim().as_bytes() {
        [a] => position(*a),
        [a, b] => Some(26 + position(*a)? * 26 + position(*b)?),
        _ => None,
    }
}

/// Search the steps for the best plateau
///
/// Returns the weighted mean age, its standard error and the inclusive step range. Steps in
/// `excludes` take no part in the plateau, and cannot start or end one. Among the qualifying
/// runs the one with the most steps wins, ties going to the larger gas fraction then the
/// earlier start.
///
/// When `options.fixed_steps` names a valid range the search is skipped.
#[must_use]
pub fn calculate_plateau_age(
    ages: &[f64],
    errors: &[f64],
    k39: &[f64],
    options: &PlateauOptions,
    excludes: &[usize],
) -> Option<(f64, f64, (usize, usize))> {
    let n = ages.len();
    if n == 0 || errors.len() != n || k39.len() != n {
        return None;
    }

    let included = |i: &usize| !excludes.contains(i);
    let range = fixed_range(options, n).or_else(|| {
        let total: f64 = k39.iter().sum();
        find_plateau(ages, errors, k39, total, options, &included)
    })?;

    let (values, errs): (Vec<f64>, Vec<f64>) = (range.0..=range.1)
        .filter(included)
        .map(|i| (ages[i], errors[i]))
        .unzip();
    if values.is_empty() {
        return None;
    }

    let (mean, error) = weighted_mean(&values, &errs);
    Some((mean, error, range))
}

fn fixed_range(options: &PlateauOptions, n: usize) -> Option<(usize, usize)> {
    let (low, high) = options.fixed_steps.as_ref()?;
    let low = alpha_index(low)?;
    let high = alpha_index(high)?;
    (low <= high && high < n).then_some((low, high))
}

fn find_plateau(
    ages: &[f64],
    errors: &[f64],
    k39: &[f64],
    total: f64,
    options: &PlateauOptions,
    included: &impl Fn(&usize) -> bool,
) -> Option<(usize, usize)> {
    let overlaps = |a: usize, b: usize| {
        let (ea, eb) = (
            errors[a] * options.overlap_sigma,
            errors[b] * options.overlap_sigma,
        );
        ages[a] - ea < ages[b] + eb && ages[a] + ea > ages[b] - eb
    };

    let mut best: Option<((usize, usize), usize, f64)> = None;
    for start in (0..ages.len()).filter(included) {
        let mut steps = vec![];
        let mut gas = 0.0;
        for end in start..ages.len() {
            if !included(&end) {
                continue;
            }
            if !steps.iter().all(|&s| overlaps(s, end)) {
                break;
            }
            steps.push(end);
            gas += k39[end];

            let fraction = if total == 0.0 { 0.0 } else { gas / total * 100.0 };
            if steps.len() < options.nsteps || fraction < options.gas_fraction {
                continue;
            }

            let better = best.map_or(true, |(_, count, best_fraction)| {
                steps.len() > count || (steps.len() == count && fraction > best_fraction)
            });
            if better {
                best = Some(((start, end), steps.len(), fraction));
            }
        }
    }

    best.map(|(range, _, _)| range)
}

#[cfg(test)]
mod tests {
    use super::{alpha_index, alpha_label, calculate_plateau_age, PlateauOptions};

    fn options() -> PlateauOptions {
        PlateauOptions {
            gas_fraction: 0.0,
            ..PlateauOptions::default()
        }
    }

    #[test]
    fn plateau_excludes_outlying_step() {
        let ages = [10.0, 10.0, 10.0, 50.0, 10.0];
        let errors = [0.1; 5];
        let k39 = [1.0; 5];

        let (age, _, (low, high)) =
            calculate_plateau_age(&ages, &errors, &k39, &options(), &[]).unwrap();

        assert_eq!((low, high), (0, 2));
        approx::assert_relative_eq!(age, 10.0);
    }

    #[test]
    fn excluded_steps_do_not_break_a_plateau() {
        let ages = [10.0, 10.0, 50.0, 10.0, 10.0];
        let errors = [0.1; 5];
        let k39 = [1.0; 5];

        let (_, _, range) =
            calculate_plateau_age(&ages, &errors, &k39, &options(), &[2]).unwrap();
        assert_eq!(range, (0, 4));
    }

    #[test]
    fn too_few_steps_is_not_a_plateau() {
        let ages = [10.0, 10.0, 20.0, 30.0];
        let errors = [0.1; 4];
        let k39 = [1.0; 4];
        assert!(calculate_plateau_age(&ages, &errors, &k39, &options(), &[]).is_none());
    }

    #[test]
    fn gas_fraction_is_required() {
        let ages = [10.0, 10.0, 10.0, 30.0];
        let errors = [0.1; 4];
        let k39 = [1.0, 1.0, 1.0, 10.0];
        let options = PlateauOptions::default();
        assert!(calculate_plateau_age(&ages, &errors, &k39, &options, &[]).is_none());
    }

    #[test]
    fn larger_gas_fraction_breaks_ties() {
        let ages = [10.0, 10.0, 10.0, 30.0, 30.0, 30.0];
        let errors = [0.1; 6];
        let k39 = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];

        let (age, _, range) =
            calculate_plateau_age(&ages, &errors, &k39, &options(), &[]).unwrap();
        assert_eq!(range, (3, 5));
        approx::assert_relative_eq!(age, 30.0);
    }

    #[test]
    fn fixed_steps_override_the_search() {
        let ages = [10.0, 20.0, 30.0, 40.0];
        let errors = [1.0; 4];
        let k39 = [1.0; 4];
        let options = PlateauOptions {
            fixed_steps: Some(("B".to_owned(), "C".to_owned())),
            ..options()
        };

        let (age, _, range) =
            calculate_plateau_age(&ages, &errors, &k39, &options, &[]).unwrap();
        assert_eq!(range, (1, 2));
        approx::assert_relative_eq!(age, 25.0);
    }

    #[test]
    fn step_labels_round_trip() {
        assert_eq!(alpha_label(0), "A");
        assert_eq!(alpha_label(25), "Z");
        assert_eq!(alpha_label(26), "AA");
        assert_eq!(alpha_label(27), "AB");
        assert_eq!(alpha_label(52), "BA");
        for index in [0, 7, 26, 51, 300] {
            assert_eq!(alpha_index(&alpha_label(index)), Some(index));
        }
        assert_eq!(alpha_index(""), None);
    }
}
