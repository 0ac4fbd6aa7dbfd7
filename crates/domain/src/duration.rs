//! Written durations, measured in whole notes.

use num_rational::Ratio;
use num_traits::{One, Zero};

use crate::DomainError;

pub type Duration = Ratio<i64>;

pub fn is_power_of_two(n: i64) -> bool {
    n > 0 && (n & (n - 1)) == 0
}

/// Largest power of two strictly less than `n`, for `n >= 2`.
pub fn largest_power_of_two_below(n: i64) -> i64 {
    let mut power = 1;
    while power * 2 < n {
        power *= 2;
    }
    power
}

/// True when `duration` can be written as one undotted or dotted note value
/// no longer than a breve.
pub fn is_assignable(duration: Duration) -> bool {
    if duration <= Duration::zero() || duration >= Duration::from_integer(2) {
        return false;
    }
    is_power_of_two(*duration.denom()) && is_power_of_two(*duration.numer() + 1)
}

/// LilyPond duration token for an assignable duration, e.g. `4`, `8.`, `2..`.
pub fn lilypond_duration(duration: Duration) -> Result<String, DomainError> {
    if !is_assignable(duration) {
        return Err(DomainError::Unassignable(duration));
    }
    // a note with n dots has numerator 2^(n+1) - 1
    let dots = (*duration.numer() + 1).trailing_zeros() as usize - 1;
    let undotted = Duration::new(*duration.numer() + 1, *duration.denom() * 2);
    let token = if undotted == Duration::one() {
        "1".to_string()
    } else {
        undotted.recip().to_integer().to_string()
    };
    Ok(format!("{}{}", token, ".".repeat(dots)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignable_durations() {
        assert!(is_assignable(Duration::new(1, 4)));
        assert!(is_assignable(Duration::new(3, 8)));
        assert!(is_assignable(Duration::new(7, 16)));
        assert!(is_assignable(Duration::one()));
        assert!(!is_assignable(Duration::new(5, 16)));
        assert!(!is_assignable(Duration::new(1, 3)));
        assert!(!is_assignable(Duration::zero()));
        assert!(!is_assignable(Duration::from_integer(2)));
    }

    #[test]
    fn lilypond_tokens() {
        assert_eq!(lilypond_duration(Duration::new(1, 4)).unwrap(), "4");
        assert_eq!(lilypond_duration(Duration::new(3, 16)).unwrap(), "8.");
        assert_eq!(lilypond_duration(Duration::new(7, 8)).unwrap(), "2..");
        assert_eq!(lilypond_duration(Duration::one()).unwrap(), "1");
        assert_eq!(lilypond_duration(Duration::new(3, 2)).unwrap(), "1.");
        assert!(lilypond_duration(Duration::new(5, 8)).is_err());
    }

    #[test]
    fn powers_of_two() {
        assert_eq!(largest_power_of_two_below(3), 2);
        assert_eq!(largest_power_of_two_below(5), 4);
        assert_eq!(largest_power_of_two_below(8), 4);
        assert!(is_power_of_two(16));
        assert!(!is_power_of_two(12));
    }
}
