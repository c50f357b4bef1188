pub(crate) mod bootstrap;
pub(crate) mod courtyard;
pub(crate) mod loop_runner;
