use std::iter::Sum;
use std::ops::{Add, AddAssign};

/// Token accounting reported by a provider.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Builds a record from prompt/completion counts, deriving the total when absent.
    pub(crate) fn from_counts(prompt: Option<u64>, completion: Option<u64>, total: Option<u64>) -> Self {
        let prompt_tokens = prompt.unwrap_or(0);
        let completion_tokens = completion.unwrap_or(0);
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total.unwrap_or(prompt_tokens.saturating_add(completion_tokens)),
        }
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Self) -> Self::Output {
        Usage {
            prompt_tokens: self.prompt_tokens.saturating_add(rhs.prompt_tokens),
            completion_tokens: self.completion_tokens.saturating_add(rhs.completion_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Usage::default(), Add::add)
    }
}

impl<'a> Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Usage records collected over one outer turn.
///
/// Records are kept individually and only summed on demand, so per-call
/// subtotals stay available. Vendors that resend a running total go through
/// [`UsageAggregator::record_snapshot`], which keeps a single record per call.
#[derive(Clone, Debug, Default)]
pub struct UsageAggregator {
    records: Vec<Usage>,
    snapshot_slot: Option<usize>,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an inner call and returns its first record index.
    pub fn begin_call(&mut self) -> usize {
        self.snapshot_slot = None;
        self.records.len()
    }

    pub fn record(&mut self, usage: Usage) {
        self.records.push(usage);
    }

    /// Replaces the current call's running total with `usage`.
    pub fn record_snapshot(&mut self, usage: Usage) {
        match self.snapshot_slot.and_then(|slot| self.records.get_mut(slot)) {
            Some(current) => *current = usage,
            None => {
                self.snapshot_slot = Some(self.records.len());
                self.records.push(usage);
            }
        }
    }

    pub fn records(&self) -> &[Usage] {
        &self.records
    }

    /// Sum of the records starting at `from` (one inner call's share).
    pub fn total_since(&self, from: usize) -> Usage {
        self.records.get(from..).unwrap_or_default().iter().sum()
    }

    pub fn total(&self) -> Usage {
        self.records.iter().sum()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
