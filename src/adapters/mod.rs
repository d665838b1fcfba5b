mod arr;
mod http_ext;
mod jellyfin;
mod request_manager;
mod stats;

pub use arr::{ArrClient, ArrItem, ArrTag, RadarrClient, SeasonStat, SonarrClient, forbidden_tag_ids};
pub use http_ext::ResponseExt;
pub use jellyfin::{Item as JellyfinItem, ItemsFilter, JellyfinClient, LibraryFolder, User, UserId};
pub use request_manager::{Requester, RequestManagerClient};
pub use stats::StatsClient;
