pub mod mapping;
pub mod profile;
pub mod recording;
pub mod requests;
pub mod responses;
pub mod session;

pub use mapping::*;
pub use profile::*;
pub use recording::*;
pub use requests::*;
pub use responses::*;
pub use session::*;
