//! Deriving per-task entries from tag metadata.
//!
//! Some trackers have no way to attribute one activity to several tasks, so
//! users tag the activity instead. Tags matching the task pattern are treated
//! as tasks and the time is apportioned evenly between them.

use std::time::Duration;

use regex::Regex;

use crate::duration::divide_rounded;
use crate::entry::{Entry, Field};

impl Entry {
    /// Splits the billable and unbillable duration into `parts` pieces.
    ///
    /// Each piece is rounded on its own, so the pieces may add up to slightly
    /// more or less than the original (at most `parts - 1` nanoseconds).
    pub fn split_duration(&self, parts: usize) -> (Duration, Duration) {
        (
            divide_rounded(self.billable, parts),
            divide_rounded(self.unbillable, parts),
        )
    }

    /// Creates one entry per tag in which `task_pattern` finds a non-empty
    /// match.
    ///
    /// Tags that do not match are skipped. When no tag matches the result is
    /// empty and the caller decides whether to keep the unsplit entry.
    pub fn split_by_tags(&self, summary: &str, task_pattern: &Regex, tags: &[Field]) -> Vec<Self> {
        let tasks: Vec<&Field> = tags
            .iter()
            .filter(|tag| {
                task_pattern
                    .find(&tag.name)
                    .is_some_and(|found| !found.as_str().is_empty())
            })
            .collect();

        if tasks.is_empty() {
            return Vec::new();
        }

        let (billable, unbillable) = self.split_duration(tasks.len());

        tasks
            .into_iter()
            .map(|task| Self {
                client: self.client.clone(),
                project: self.project.clone(),
                task: task.clone(),
                summary: summary.to_string(),
                notes: self.notes.clone(),
                start: self.start,
                billable,
                unbillable,
            })
            .collect()
    }

    /// Splits by tags, falling back to the unsplit entry when no tag matches.
    pub fn split_by_tags_or_keep(
        &self,
        summary: &str,
        task_pattern: &Regex,
        tags: &[Field],
    ) -> Vec<Self> {
        let split = self.split_by_tags(summary, task_pattern, tags);
        if split.is_empty() {
            vec![self.clone()]
        } else {
            split
        }
    }
}
