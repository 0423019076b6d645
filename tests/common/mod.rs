pub(crate) mod fake_issuer;

pub(crate) mod fixtures;

pub(crate) mod logging;
