// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::lighting::effect::Effect;

/// Which entry point a deferred call goes through once it is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeferredKind {
    Add,
    Set,
}

/// An effect call posted with an offset.
#[derive(Debug)]
pub(crate) struct DeferredCommand {
    pub kind: DeferredKind,
    pub name: String,
    pub effect: Effect,
    pub is_persistent: bool,
    /// Fired once the command has run.
    pub notify: Option<oneshot::Sender<()>>,
}

#[derive(Debug)]
struct Scheduled {
    due: Duration,
    sequence: u64,
    command: DeferredCommand,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed so the heap pops the earliest command, ties broken by posting order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Deferred effect calls, drained in timestamp order against the engine clock.
#[derive(Debug, Default)]
pub(crate) struct Schedule {
    heap: BinaryHeap<Scheduled>,
    next_sequence: u64,
}

impl Schedule {
    pub fn push(&mut self, due: Duration, command: DeferredCommand) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Scheduled {
            due,
            sequence,
            command,
        });
    }

    /// Pop the earliest command if it is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<DeferredCommand> {
        if self.heap.peek().is_some_and(|next| next.due <= now) {
            self.heap.pop().map(|scheduled| scheduled.command)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str) -> DeferredCommand {
        DeferredCommand {
            kind: DeferredKind::Add,
            name: name.to_string(),
            effect: Effect::new(name, ""),
            is_persistent: false,
            notify: None,
        }
    }

    #[test]
    fn test_pops_in_due_then_posting_order() {
        let mut schedule = Schedule::default();
        schedule.push(Duration::from_millis(300), command("late"));
        schedule.push(Duration::from_millis(100), command("first"));
        schedule.push(Duration::from_millis(100), command("second"));

        assert!(schedule.pop_due(Duration::from_millis(50)).is_none());

        let now = Duration::from_millis(200);
        assert_eq!(schedule.pop_due(now).unwrap().name, "first");
        assert_eq!(schedule.pop_due(now).unwrap().name, "second");
        assert!(schedule.pop_due(now).is_none());
        assert_eq!(schedule.len(), 1);
    }
}
