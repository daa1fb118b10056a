mod proxy;
mod router;

pub use proxy::{Proxy, ProxyError};
pub use router::{ProxyRule, RouteBinding, RouteMatch, RouteTable, API_PREFIX};
