pub(crate) mod fd;
pub(crate) mod inspect;
pub(crate) mod path;
pub(crate) mod scan;

pub(crate) use fd::{command_fd, command_verify};
pub(crate) use inspect::command_inspect;
pub(crate) use path::command_path;
pub(crate) use scan::command_scan;
