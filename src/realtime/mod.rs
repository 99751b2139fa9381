//! Fix processing on a tokio task: the host pushes commands, the task owns
//! the controller and reports alerts back over a channel.

pub mod filter;
pub mod worker;

pub use filter::{FilterVerdict, FixFilter};
pub use worker::{spawn_navigator, Command, NavEvent, NavSnapshot, NavigatorHandle};
