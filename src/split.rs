use anyhow::{Result, bail};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Dev,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Dev, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Dev => "dev",
            Self::Test => "test",
        }
    }

    /// Stored integer label: train=0, dev=1, test=2.
    pub fn code(self) -> i64 {
        match self {
            Self::Train => 0,
            Self::Dev => 1,
            Self::Test => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Train),
            1 => Some(Self::Dev),
            2 => Some(Self::Test),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SplitFractions {
    pub train_end: f64,
    pub dev_end: f64,
}

impl SplitFractions {
    pub fn new(train_end: f64, dev_end: f64) -> Result<Self> {
        if !(train_end > 0.0 && train_end < dev_end && dev_end < 1.0) {
            bail!(
                "split fractions must satisfy 0 < train_end < dev_end < 1 (got {train_end}, {dev_end})"
            );
        }
        Ok(Self { train_end, dev_end })
    }

    fn split_for_index(&self, index: usize, len: usize) -> Split {
        let position = index as f64;
        let len = len as f64;
        if position < self.train_end * len {
            Split::Train
        } else if position < self.dev_end * len {
            Split::Dev
        } else {
            Split::Test
        }
    }
}

/// Sorts names ascending and labels them by cumulative position.
pub fn assign_splits<S: AsRef<str>>(
    names: &[S],
    fractions: SplitFractions,
) -> Vec<(String, Split)> {
    let mut sorted: Vec<&str> = names.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let len = sorted.len();
    sorted
        .into_iter()
        .enumerate()
        .map(|(index, name)| (name.to_string(), fractions.split_for_index(index, len)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names_in(assignment: &[(String, Split)], split: Split) -> Vec<&str> {
        assignment
            .iter()
            .filter(|(_, assigned)| *assigned == split)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    #[test]
    fn four_documents_split_half_quarter_quarter() {
        let fractions = SplitFractions::new(0.5, 0.75).unwrap();
        let assignment = assign_splits(&["d", "b", "a", "c"], fractions);

        assert_eq!(names_in(&assignment, Split::Train), vec!["a", "b"]);
        assert_eq!(names_in(&assignment, Split::Dev), vec!["c"]);
        assert_eq!(names_in(&assignment, Split::Test), vec!["d"]);
    }

    #[test]
    fn assignment_is_a_partition_with_expected_sizes() {
        let names: Vec<String> = (0..103).map(|index| format!("doc{index:03}")).collect();
        let fractions = SplitFractions::new(0.5, 0.75).unwrap();
        let assignment = assign_splits(&names, fractions);

        assert_eq!(assignment.len(), names.len());
        let train = names_in(&assignment, Split::Train).len();
        let dev = names_in(&assignment, Split::Dev).len();
        let test = names_in(&assignment, Split::Test).len();
        assert_eq!(train + dev + test, names.len());
        // 51.5 -> indices 0..=51, 77.25 -> indices 52..=77
        assert_eq!(train, 52);
        assert_eq!(dev, 26);
        assert_eq!(test, 25);
    }

    #[test]
    fn assignment_ignores_input_order() {
        let fractions = SplitFractions::new(0.6, 0.8).unwrap();
        let forward = assign_splits(&["a", "b", "c", "d", "e"], fractions);
        let reversed = assign_splits(&["e", "d", "c", "b", "a"], fractions);
        assert_eq!(forward, reversed);
    }

    #[test]
    fn fractions_must_be_ordered_inside_unit_interval() {
        assert!(SplitFractions::new(0.0, 0.5).is_err());
        assert!(SplitFractions::new(0.5, 0.5).is_err());
        assert!(SplitFractions::new(0.8, 0.6).is_err());
        assert!(SplitFractions::new(0.5, 1.0).is_err());
        assert!(SplitFractions::new(0.5, 0.75).is_ok());
    }

    #[test]
    fn split_codes_round_trip() {
        for split in Split::ALL {
            assert_eq!(Split::from_code(split.code()), Some(split));
        }
        assert_eq!(Split::from_code(7), None);
    }
}
