use serde::{Deserialize, Serialize};

use crate::error::{AlignError, AlignResult};

/// Case folding shared by pass detection and label agreement.
fn fold(label: &str) -> String {
    label.to_lowercase()
}

/// `"pass"` in any case is a pass; every other label is a fail.
pub fn is_pass(label: &str) -> bool {
    fold(label) == "pass"
}

fn labels_match(a: &str, b: &str) -> bool {
    fold(a) == fold(b)
}

fn check_lengths(human: usize, judge: usize) -> AlignResult<()> {
    if human != judge {
        return Err(AlignError::invalid_input(format!(
            "human labels and judge results must have the same length ({} vs {})",
            human, judge
        )));
    }
    Ok(())
}

/// Binary pass/fail confusion matrix, human labels as ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Human pass, judge pass.
    pub true_positive: usize,
    /// Human pass, judge fail.
    pub false_negative: usize,
    /// Human fail, judge pass.
    pub false_positive: usize,
    /// Human fail, judge fail.
    pub true_negative: usize,
}

impl ConfusionMatrix {
    pub fn from_labels<H, J>(human: &[H], judge: &[J]) -> AlignResult<Self>
    where
        H: AsRef<str>,
        J: AsRef<str>,
    {
        check_lengths(human.len(), judge.len())?;

        let mut matrix = Self::default();
        for (h, j) in human.iter().zip(judge) {
            match (is_pass(h.as_ref()), is_pass(j.as_ref())) {
                (true, true) => matrix.true_positive += 1,
                (true, false) => matrix.false_negative += 1,
                (false, true) => matrix.false_positive += 1,
                (false, false) => matrix.true_negative += 1,
            }
        }
        Ok(matrix)
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_negative + self.false_positive + self.true_negative
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Traces where human and judge gave the same label, ignoring case.
pub fn agreement_count<H, J>(human: &[H], judge: &[J]) -> AlignResult<usize>
where
    H: AsRef<str>,
    J: AsRef<str>,
{
    check_lengths(human.len(), judge.len())?;
    Ok(human
        .iter()
        .zip(judge)
        .filter(|(h, j)| labels_match(h.as_ref(), j.as_ref()))
        .count())
}

/// Agreement of two judge versions with human labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentMetrics {
    pub total_samples: usize,
    pub previous_agreement_count: usize,
    pub new_agreement_count: usize,
    pub confusion_matrix_previous: ConfusionMatrix,
    pub confusion_matrix_new: ConfusionMatrix,
}

impl AlignmentMetrics {
    pub fn from_labels<S: AsRef<str>>(
        human: &[S],
        previous: &[S],
        new: &[S],
    ) -> AlignResult<Self> {
        Ok(Self {
            total_samples: human.len(),
            previous_agreement_count: agreement_count(human, previous)?,
            new_agreement_count: agreement_count(human, new)?,
            confusion_matrix_previous: ConfusionMatrix::from_labels(human, previous)?,
            confusion_matrix_new: ConfusionMatrix::from_labels(human, new)?,
        })
    }

    pub fn previous_agreement_rate(&self) -> f64 {
        ratio(self.previous_agreement_count, self.total_samples)
    }

    pub fn new_agreement_rate(&self) -> f64 {
        ratio(self.new_agreement_count, self.total_samples)
    }
}
