pub mod cancel;
pub mod init;
pub mod list;
pub mod refresh;
pub mod save;
pub mod search;
pub mod set;
pub mod show;
pub mod version;

pub use cancel::Cancel;
pub use init::Init;
pub use list::List;
pub use refresh::Refresh;
pub use save::Save;
pub use search::Search;
pub use set::Set;
pub use show::Show;
pub use version::Version;
