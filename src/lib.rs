//! SimCity 4 plugin that stops the game from kicking lower wealth occupants out of buildings when
//! the tract developer redevelops them.
//!
//! The game loads the DLL from its Plugins folder and asks it for a director through
//! `GZDllGetGZCOMDirector`. The director subscribes to the city init messages and, before each
//! city loads, clears the "Tract Developer Kick Out Lower Wealth" flag in the game's cached copy
//! of the building development simulator tuning exemplar.

// The director export is the crate's only root, and it exists only on Windows x86. Other
// non-test builds have nothing reachable.
#![cfg_attr(
    all(not(test), not(all(windows, target_arch = "x86"))),
    allow(dead_code)
)]

mod director;
mod host;
mod logging;
mod patch;
mod resources;
mod settings;
