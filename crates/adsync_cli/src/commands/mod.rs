pub(crate) mod connection;
pub(crate) mod docs;
pub(crate) mod insights;
pub(crate) mod migrate;
pub(crate) mod renew;
pub(crate) mod serve;
pub(crate) mod shared;
pub(crate) mod status;
pub(crate) mod sync;
