mod dashboard;
mod form;
mod records;

pub use dashboard::DashboardView;
pub use form::FormView;
pub use records::RecordListView;
