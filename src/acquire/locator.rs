#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Transport named by a repository locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transport {
    /// `https://github.com/...`
    Https,
    /// `http://github.com/...`
    Http,
    /// `git@github.com:...`
    Ssh,
}

/// A syntactically valid repository locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoLocator {
    /// Transport the locator was written with.
    pub transport: Transport,
    /// Account or organization owning the repository.
    pub owner:     String,
    /// Repository name without a `.git` suffix.
    pub name:      String,
}

impl RepoLocator {
    /// The URL handed to the clone command, always ending in `.git`.
    pub fn clone_url(&self) -> String {
        match self.transport {
            Transport::Https => format!("https://github.com/{}/{}.git", self.owner, self.name),
            Transport::Http => format!("http://github.com/{}/{}.git", self.owner, self.name),
            Transport::Ssh => format!("git@github.com:{}/{}.git", self.owner, self.name),
        }
    }
}

impl Display for RepoLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Builds a locator, rejecting names that are empty once `.git` is removed
/// or consist only of dots.
fn make_locator(
    transport: Transport,
    owner: &str,
    raw_name: &str,
) -> Result<RepoLocator, &'static str> {
    let name = raw_name.strip_suffix(".git").unwrap_or(raw_name);
    if name.trim_matches('.').is_empty() {
        return Err("repository name");
    }
    Ok(RepoLocator {
        transport,
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

peg::parser! {
    /// Grammar for the repository locators the acquirer accepts.
    pub grammar locator() for str {
        /// an owner segment: letters, digits, `_` and `-`
        rule owner() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-']+)

        /// a repository segment, which may also contain dots
        rule repo() -> &'input str
            = $(['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.']+)

        /// `http` or `https`
        rule transport() -> Transport
            = "https" { Transport::Https }
            / "http" { Transport::Http }

        /// github host, with or without `www.`
        rule host()
            = "www."? "github.com"

        /// `https://github.com/<owner>/<repo>[.git][/]`
        rule web() -> RepoLocator
            = t:transport() "://" host() "/" o:owner() "/" r:repo() "/"?
            {? make_locator(t, o, r) }

        /// `git@github.com:<owner>/<repo>[.git]`
        rule scp() -> RepoLocator
            = "git@github.com:" o:owner() "/" r:repo()
            {? make_locator(Transport::Ssh, o, r) }

        /// parses a complete locator
        pub rule parse() -> RepoLocator
            = l:(web() / scp()) ![_] { l }
    }
}

/// Parses a repository locator, ignoring surrounding whitespace.
pub fn parse_locator(input: &str) -> Option<RepoLocator> {
    locator::parse(input.trim()).ok()
}
