//! Full gRPC method paths, as seen in the `:path` pseudo-header.

/// Exchanges credentials for an access token.
pub const LOGIN: &str = "/pcbook.AuthService/Login";
/// Stores a new laptop.
pub const CREATE_LAPTOP: &str = "/pcbook.LaptopService/CreateLaptop";
/// Streams laptops matching a filter.
pub const SEARCH_LAPTOP: &str = "/pcbook.LaptopService/SearchLaptop";
/// Streams an image for a laptop in chunks.
pub const UPLOAD_IMAGE: &str = "/pcbook.LaptopService/UploadImage";
/// Rates laptops and streams back running averages.
pub const RATE_LAPTOP: &str = "/pcbook.LaptopService/RateLaptop";

/// Methods that only succeed with an attached access token.
pub const AUTHENTICATED: [&str; 3] = [CREATE_LAPTOP, UPLOAD_IMAGE, RATE_LAPTOP];
