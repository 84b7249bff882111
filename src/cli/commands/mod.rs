pub(super) mod check;
pub(super) mod submit;
pub(super) mod watch;
