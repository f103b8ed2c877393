use mixfs_common::hop::wrap;

/// A request's path through the relays and its reply's path back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixRoute {
    /// Relays to the server followed by the server itself.
    pub forward: Vec<String>,
    /// Relays back followed by the client's own address.
    pub back: Vec<String>,
}

impl MixRoute {
    /// Builds the route `forward_relays → server → return_relays → reply_to`.
    #[must_use]
    pub fn new(
        forward_relays: &[String],
        server: &str,
        return_relays: &[String],
        reply_to: &str,
    ) -> Self {
        let mut forward = forward_relays.to_vec();
        forward.push(server.to_owned());
        let mut back = return_relays.to_vec();
        back.push(reply_to.to_owned());
        Self { forward, back }
    }

    /// Wraps `rpc` for the first forward hop.
    ///
    /// Every node on the way removes one layer. The server receives
    /// `[return route, rpc]` and sends its reply along the return route.
    #[must_use]
    pub fn wrap(&self, rpc: &[u8]) -> (String, Vec<u8>) {
        let hops: Vec<&str> = self
            .forward
            .iter()
            .chain(&self.back)
            .map(String::as_str)
            .collect();
        // forward always holds the server
        wrap(&hops, rpc).unwrap_or_default()
    }
}
