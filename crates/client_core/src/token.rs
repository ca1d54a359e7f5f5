use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FetchToken(u64);

impl fmt::Display for FetchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-loader token source. A response may only commit while its token is
/// still the latest one minted.
#[derive(Debug, Default)]
pub(crate) struct TokenSource {
    latest: FetchToken,
}

impl TokenSource {
    pub(crate) fn mint(&mut self) -> FetchToken {
        self.latest = FetchToken(self.latest.0 + 1);
        self.latest
    }

    pub(crate) fn latest(&self) -> FetchToken {
        self.latest
    }

    pub(crate) fn is_current(&self, token: FetchToken) -> bool {
        self.latest == token
    }
}
