pub(crate) mod helpers;
mod lifecycle;
