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

/// Errors raised by the cue registry. These indicate a configuration mistake and are
/// never expected while a show is running.
#[derive(Debug, thiserror::Error)]
pub enum CueRegistryError {
    #[error("no cue group named {0} is registered")]
    UnknownGroup(String),

    #[error("no default cue group has been set")]
    NoDefaultGroup,

    #[error("a cue group named {0} is already registered")]
    DuplicateGroup(String),

    #[error("unknown cue type: {0}")]
    UnknownCueType(String),
}
