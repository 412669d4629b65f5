//! Canonical, interned URL values.
//!
//! A [`Href`] splits a URL into a protocol tag, a "www." flag, a top-level
//! domain tag, the remaining host fragment and the path. The three tags are
//! packed into one `u16`; [`Href::format`] expands them back into a URL that
//! is equivalent to (but not necessarily byte-identical with) the input.
//!
//! Identical canonical URLs share a single immutable instance. The registry
//! only holds weak references, so an entry disappears when the last `Href`
//! pointing at it is dropped.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const PROTOCOL_MASK: u16 = 0x000f;
const WWW_FLAG: u16 = 0x0010;
const TLD_SHIFT: u32 = 5;
const TLD_MASK: u16 = 0x07e0;

/// Known top-level domains. Index 0 means "not packed".
/// Multi-label entries must come before their last label.
const TLDS: [&str; 40] = [
    "", "co.uk", "com.au", "co.jp", "com", "org", "net", "edu", "gov", "mil", "int", "info", "biz",
    "io", "dev", "app", "de", "uk", "fr", "jp", "ru", "it", "nl", "ca", "au", "us", "ch", "se",
    "es", "pl", "br", "cn", "in", "at", "be", "dk", "no", "fi", "cz", "eu",
];

/// URL scheme tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    /// Unrecognized scheme; the raw text is kept verbatim in the path.
    Other,
    Http,
    Https,
    Ftp,
    File,
    Mailto,
    News,
}

impl Protocol {
    const ALL: [Protocol; 7] = [
        Protocol::Other,
        Protocol::Http,
        Protocol::Https,
        Protocol::Ftp,
        Protocol::File,
        Protocol::Mailto,
        Protocol::News,
    ];

    fn prefix(self) -> &'static str {
        match self {
            Protocol::Other => "",
            Protocol::Http => "http://",
            Protocol::Https => "https://",
            Protocol::Ftp => "ftp://",
            Protocol::File => "file://",
            Protocol::Mailto => "mailto:",
            Protocol::News => "news:",
        }
    }

    /// Protocols with an authority component that gets host canonicalization.
    fn is_hierarchical(self) -> bool {
        matches!(self, Protocol::Http | Protocol::Https | Protocol::Ftp | Protocol::File)
    }

    fn bits(self) -> u16 {
        self as u16
    }

    fn from_bits(bits: u16) -> Self {
        Self::ALL
            .get((bits & PROTOCOL_MASK) as usize)
            .copied()
            .unwrap_or(Protocol::Other)
    }

    fn detect(raw: &str) -> Self {
        Self::ALL[1..]
            .iter()
            .copied()
            .find(|p| starts_with_ignore_case(raw, p.prefix()))
            .unwrap_or(Protocol::Other)
    }
}

/// Canonical parts of a URL, before interning.
struct Parts {
    packed: u16,
    host: Box<str>,
    path: Box<str>,
}

impl Parts {
    fn parse(raw: &str) -> Self {
        let protocol = Protocol::detect(raw);
        if protocol == Protocol::Other {
            return Self {
                packed: Protocol::Other.bits(),
                host: "".into(),
                path: raw.into(),
            };
        }

        let rest = &raw[protocol.prefix().len()..];
        if !protocol.is_hierarchical() {
            return Self {
                packed: protocol.bits(),
                host: "".into(),
                path: rest.into(),
            };
        }

        let split = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let authority = rest[..split].to_ascii_lowercase();
        let mut path = rest[split..].to_string();
        if path.is_empty() && protocol != Protocol::File {
            path.push('/');
        }

        let mut packed = protocol.bits();
        let mut host = authority.as_str();

        // ports and userinfo keep the authority verbatim
        if !host.contains([':', '@']) {
            if let Some(stripped) = host.strip_prefix("www.") {
                if !stripped.is_empty() {
                    packed |= WWW_FLAG;
                    host = stripped;
                }
            }
            if let Some((index, tld)) = TLDS
                .iter()
                .enumerate()
                .skip(1)
                .find(|(_, tld)| host.len() > tld.len() + 1 && host.ends_with(&format!(".{}", tld)))
            {
                packed |= (index as u16) << TLD_SHIFT;
                host = &host[..host.len() - tld.len() - 1];
            }
        }

        Self {
            packed,
            host: host.into(),
            path: path.into(),
        }
    }

    fn protocol(&self) -> Protocol {
        Protocol::from_bits(self.packed)
    }

    fn www(&self) -> bool {
        self.packed & WWW_FLAG != 0
    }

    fn tld(&self) -> &'static str {
        TLDS.get(((self.packed & TLD_MASK) >> TLD_SHIFT) as usize)
            .copied()
            .unwrap_or("")
    }

    fn format(&self) -> String {
        let tld = self.tld();
        let mut out = String::with_capacity(self.host.len() + self.path.len() + 16);
        out.push_str(self.protocol().prefix());
        if self.www() {
            out.push_str("www.");
        }
        out.push_str(&self.host);
        if !tld.is_empty() {
            out.push('.');
            out.push_str(tld);
        }
        out.push_str(&self.path);
        out
    }
}

/// Registry-owned instance; removes its own registry entry when released.
struct HrefData(Parts);

impl std::ops::Deref for HrefData {
    type Target = Parts;

    fn deref(&self) -> &Parts {
        &self.0
    }
}

impl Drop for HrefData {
    fn drop(&mut self) {
        let Some(registry) = REGISTRY.get() else {
            return;
        };
        let key = self.0.format();
        let mut map = registry.lock();
        // a concurrent intern may already have replaced the entry
        if map.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
            map.remove(&key);
        }
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<HrefData>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Weak<HrefData>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// A canonical, interned URL.
#[derive(Clone)]
pub struct Href(Arc<HrefData>);

impl Href {
    /// Interns `raw`. Any string is accepted.
    pub fn intern(raw: &str) -> Self {
        let parts = Parts::parse(raw.trim());
        let key = parts.format();

        let mut map = registry().lock();
        if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
            return Href(existing);
        }
        let fresh = Arc::new(HrefData(parts));
        map.insert(key, Arc::downgrade(&fresh));
        Href(fresh)
    }

    /// The empty URL, used for bookmarks that have not been given one yet.
    pub fn empty() -> Self {
        Self::intern("")
    }

    /// Reconstructs a URL string from the canonical parts.
    pub fn format(&self) -> String {
        self.0.format()
    }

    pub fn protocol(&self) -> Protocol {
        self.0.protocol()
    }

    pub fn has_www(&self) -> bool {
        self.0.www()
    }

    /// Host without the "www." prefix and without a packed top-level domain.
    pub fn host_fragment(&self) -> &str {
        &self.0.host
    }

    /// The packed top-level domain, or `""` when none was recognized.
    pub fn tld(&self) -> &'static str {
        self.0.tld()
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn is_empty(&self) -> bool {
        self.0.protocol() == Protocol::Other && self.0.path.is_empty()
    }

    /// Returns true if both values point at the same interned instance.
    pub fn ptr_eq(a: &Href, b: &Href) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Total order on canonical forms: host, domain, "www.", protocol, path.
    pub fn canonical_compare(a: &Href, b: &Href) -> Ordering {
        if Self::ptr_eq(a, b) {
            return Ordering::Equal;
        }
        a.0.host
            .cmp(&b.0.host)
            .then_with(|| a.0.tld().cmp(b.0.tld()))
            .then_with(|| a.0.www().cmp(&b.0.www()))
            .then_with(|| a.0.protocol().cmp(&b.0.protocol()))
            .then_with(|| a.0.path.cmp(&b.0.path))
    }

    /// Returns true if an instance for this URL's canonical form is alive.
    pub fn is_interned(raw: &str) -> bool {
        let key = Parts::parse(raw.trim()).format();
        registry()
            .lock()
            .get(&key)
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

impl PartialEq for Href {
    fn eq(&self, other: &Self) -> bool {
        Self::canonical_compare(self, other) == Ordering::Equal
    }
}

impl Eq for Href {}

impl PartialOrd for Href {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Href {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::canonical_compare(self, other)
    }
}

impl Hash for Href {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.packed.hash(state);
        self.0.host.hash(state);
        self.0.path.hash(state);
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl fmt::Debug for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Href({:?})", self.format())
    }
}

impl Serialize for Href {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.format())
    }
}

impl<'de> Deserialize<'de> for Href {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Href::intern(&raw))
    }
}
