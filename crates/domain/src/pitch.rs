use std::fmt;

use serde::{Deserialize, Serialize};

/// Pitch class names in LilyPond's default (Dutch) spelling, sharps only.
const LY_PITCH_NAMES: [&str; 12] = [
    "c", "cis", "d", "dis", "e", "f", "fis", "g", "gis", "a", "ais", "b",
];

/// A chromatic pitch, counted in semitones above middle C (0 = c').
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Pitch(pub i32);

impl Pitch {
    pub fn new(semitones: i32) -> Self {
        Self(semitones)
    }

    pub fn semitones(self) -> i32 {
        self.0
    }

    /// Absolute LilyPond spelling, e.g. `cis'` or `bes,`.
    pub fn lilypond_name(self) -> String {
        let pitch_class = self.0.rem_euclid(12) as usize;
        // c' is the octave containing 0, so the unmarked octave starts at -12.
        let octave = self.0.div_euclid(12) + 1;
        let mut name = LY_PITCH_NAMES[pitch_class].to_string();
        let mark = if octave > 0 { '\'' } else { ',' };
        for _ in 0..octave.unsigned_abs() {
            name.push(mark);
        }
        name
    }
}

impl From<i32> for Pitch {
    fn from(semitones: i32) -> Self {
        Self(semitones)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lilypond_name())
    }
}
