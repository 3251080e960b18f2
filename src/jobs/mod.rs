pub mod cleanup;
pub mod manager;
pub mod table;
pub mod worker;

pub use cleanup::RetrievedFile;
pub use manager::{JobManager, ManagerSettings, StartedDownload};
pub use table::{JobId, JobState, JobStatus, JobTable, ResultFile, StatusReport};
