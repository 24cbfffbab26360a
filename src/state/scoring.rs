//! Time-decay scoring.
//!
//! A correct answer earns [`BASE_POINTS`] plus a speed bonus proportional to the time left,
//! so the bonus never exceeds the base and a correct answer given at the deadline still
//! earns the full base.

use super::round::Round;

/// Points for any correct answer, and upper bound of the speed bonus.
pub const BASE_POINTS: u32 = 100;

/// Points awarded for `selected_option_index` answered `elapsed_ms` into `round`.
pub fn score(round: &Round, selected_option_index: Option<usize>, elapsed_ms: u64) -> u32 {
    let Some(selected) = selected_option_index else {
        return 0;
    };
    if !round.is_correct(selected) || round.duration_ms == 0 {
        return 0;
    }

    let duration = round.duration_ms;
    let remaining = duration.saturating_sub(elapsed_ms.min(duration));
    let bonus = u128::from(remaining) * u128::from(BASE_POINTS) / u128::from(duration);

    BASE_POINTS + bonus as u32
}
