// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Record live traffic and play it back without a connection.
//!
//! Recording: install a [`ReplayCommands`] on a live [`ShellSession`] or
//! [`CopyService`] with [`enable`], exercise it, then [`ReplayCommands::store`].
//! Playback: [`ReplayCommands::open`] the directory and drive a
//! [`ReplaySession`] or [`ReplayStorage`] through the same traits.
//!
//! [`ShellSession`]: crate::session::ShellSession
//! [`CopyService`]: crate::transfer::CopyService

mod commands;
mod session;
mod storage;

pub use commands::{ReplayCommands, ReplayError};
pub use session::ReplaySession;
pub use storage::ReplayStorage;

use std::sync::Arc;

/// Live components that can feed a recorder.
pub trait Replayable {
    /// Install (`Some`) or remove (`None`) the recorder.
    fn set_replay(&mut self, replay: Option<Arc<ReplayCommands>>);
}

/// Start recording everything `target` sends and receives into `replay`.
pub fn enable<T: Replayable + ?Sized>(target: &mut T, replay: Arc<ReplayCommands>) {
    target.set_replay(Some(replay));
}

/// Stop recording on `target`.
pub fn disable<T: Replayable + ?Sized>(target: &mut T) {
    target.set_replay(None);
}
