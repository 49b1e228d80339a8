//! Vault item types: credentials, message templates, and links.
//!
//! Every item carries a plaintext `id` plus a fixed set of confidential
//! text fields. The [`Record`] trait publishes that field set per kind so
//! the codec can encrypt "every field except `id`" from a static table
//! instead of enumerating properties at run time.

use std::fmt;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Item kinds
// ---------------------------------------------------------------------------

/// The three item kinds, one collection each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Site login.
    Credential,
    /// Canned message template.
    Message,
    /// Bookmark.
    Link,
}

impl ItemKind {
    /// Every kind, in persistence order.
    pub const ALL: [Self; 3] = [Self::Credential, Self::Message, Self::Link];

    /// Storage key of this kind's collection.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Credential => "credentials",
            Self::Message => "messages",
            Self::Link => "links",
        }
    }

    /// Singular name, as used in mirror notifications.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Credential => "credential",
            Self::Message => "message",
            Self::Link => "link",
        }
    }

    /// Names of the encrypted fields (everything except `id`), in order.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Credential => &["site", "url", "user", "pass"],
            Self::Message => &["title", "body"],
            Self::Link => &["name", "url"],
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Site credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Unique identifier (UUID v4), plaintext at rest.
    pub id: String,
    /// Display name of the site.
    pub site: String,
    /// Login URL.
    pub url: String,
    /// Username or email.
    pub user: String,
    /// Password.
    pub pass: String,
}

/// Canned message template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier (UUID v4), plaintext at rest.
    pub id: String,
    /// Title shown in lists.
    pub title: String,
    /// Message body.
    pub body: String,
}

/// Bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Unique identifier (UUID v4), plaintext at rest.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Target URL.
    pub url: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("site", &self.site)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.site.zeroize();
        self.url.zeroize();
        self.user.zeroize();
        self.pass.zeroize();
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        self.title.zeroize();
        self.body.zeroize();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.name.zeroize();
        self.url.zeroize();
    }
}

/// Any vault item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VaultItem {
    /// A credential.
    Credential(Credential),
    /// A message template.
    Message(Message),
    /// A link.
    Link(Link),
}

impl VaultItem {
    /// Kind of this item.
    #[must_use]
    pub const fn kind(&self) -> ItemKind {
        match self {
            Self::Credential(_) => ItemKind::Credential,
            Self::Message(_) => ItemKind::Message,
            Self::Link(_) => ItemKind::Link,
        }
    }

    /// Identifier of this item.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Credential(c) => &c.id,
            Self::Message(m) => &m.id,
            Self::Link(l) => &l.id,
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory collections
// ---------------------------------------------------------------------------

/// The three decrypted collections of an unlocked session, in display order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collections {
    /// `"credentials"`.
    pub credentials: Vec<Credential>,
    /// `"messages"`.
    pub messages: Vec<Message>,
    /// `"links"`.
    pub links: Vec<Link>,
}

// ---------------------------------------------------------------------------
// Record trait
// ---------------------------------------------------------------------------

/// A concrete item type with a static encrypted-field table.
pub trait Record: Clone + Sized {
    /// Kind tag of this record type.
    const KIND: ItemKind;

    /// Plaintext identifier.
    fn id(&self) -> &str;

    /// `(name, value)` for every field except `id`, in [`ItemKind::fields`] order.
    fn fields(&self) -> Vec<(&'static str, &str)>;

    /// Rebuild a record from its `id` and a lookup for each field name.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `field`.
    fn from_fields<F>(id: String, field: F) -> Result<Self, VaultError>
    where
        F: FnMut(&'static str) -> Result<String, VaultError>;

    /// Case-insensitive search over the fields shown in lists.
    /// `needle` is already lowercased.
    fn matches(&self, needle: &str) -> bool;

    /// Wrap into the [`VaultItem`] union.
    fn into_item(self) -> VaultItem;

    /// This type's collection inside [`Collections`].
    fn collection(collections: &Collections) -> &Vec<Self>;

    /// Mutable access to this type's collection inside [`Collections`].
    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self>;
}

fn contains_lowercase(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

impl Record for Credential {
    const KIND: ItemKind = ItemKind::Credential;

    fn id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        let Self {
            id: _,
            site,
            url,
            user,
            pass,
        } = self;
        vec![
            ("site", site.as_str()),
            ("url", url.as_str()),
            ("user", user.as_str()),
            ("pass", pass.as_str()),
        ]
    }

    fn from_fields<F>(id: String, mut field: F) -> Result<Self, VaultError>
    where
        F: FnMut(&'static str) -> Result<String, VaultError>,
    {
        Ok(Self {
            id,
            site: field("site")?,
            url: field("url")?,
            user: field("user")?,
            pass: field("pass")?,
        })
    }

    fn matches(&self, needle: &str) -> bool {
        // The password is never searchable.
        contains_lowercase(&self.site, needle)
            || contains_lowercase(&self.user, needle)
            || contains_lowercase(&self.url, needle)
    }

    fn into_item(self) -> VaultItem {
        VaultItem::Credential(self)
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.credentials
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.credentials
    }
}

impl Record for Message {
    const KIND: ItemKind = ItemKind::Message;

    fn id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        let Self { id: _, title, body } = self;
        vec![("title", title.as_str()), ("body", body.as_str())]
    }

    fn from_fields<F>(id: String, mut field: F) -> Result<Self, VaultError>
    where
        F: FnMut(&'static str) -> Result<String, VaultError>,
    {
        Ok(Self {
            id,
            title: field("title")?,
            body: field("body")?,
        })
    }

    fn matches(&self, needle: &str) -> bool {
        contains_lowercase(&self.title, needle) || contains_lowercase(&self.body, needle)
    }

    fn into_item(self) -> VaultItem {
        VaultItem::Message(self)
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.messages
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.messages
    }
}

impl Record for Link {
    const KIND: ItemKind = ItemKind::Link;

    fn id(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        let Self { id: _, name, url } = self;
        vec![("name", name.as_str()), ("url", url.as_str())]
    }

    fn from_fields<F>(id: String, mut field: F) -> Result<Self, VaultError>
    where
        F: FnMut(&'static str) -> Result<String, VaultError>,
    {
        Ok(Self {
            id,
            name: field("name")?,
            url: field("url")?,
        })
    }

    fn matches(&self, needle: &str) -> bool {
        contains_lowercase(&self.name, needle) || contains_lowercase(&self.url, needle)
    }

    fn into_item(self) -> VaultItem {
        VaultItem::Link(self)
    }

    fn collection(collections: &Collections) -> &Vec<Self> {
        &collections.links
    }

    fn collection_mut(collections: &mut Collections) -> &mut Vec<Self> {
        &mut collections.links
    }
}

// ---------------------------------------------------------------------------
// Drafts (data without id) and patches (partial updates)
// ---------------------------------------------------------------------------

/// Fields of a new credential.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialDraft {
    /// Display name of the site.
    pub site: String,
    /// Login URL.
    pub url: String,
    /// Username or email.
    pub user: String,
    /// Password.
    pub pass: String,
}

impl fmt::Debug for CredentialDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDraft")
            .field("site", &self.site)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("pass", &"***")
            .finish()
    }
}

impl Drop for CredentialDraft {
    fn drop(&mut self) {
        self.pass.zeroize();
    }
}

/// Fields of a new message template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDraft {
    /// Title shown in lists.
    pub title: String,
    /// Message body.
    pub body: String,
}

/// Fields of a new link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkDraft {
    /// Display name.
    pub name: String,
    /// Target URL.
    pub url: String,
}

/// Partial credential update. `None` keeps the current value.
///
/// An empty `pass` also keeps the current password: clearing a password
/// through an update is not possible.
#[derive(Clone, Default, Deserialize)]
pub struct CredentialPatch {
    /// New site name.
    pub site: Option<String>,
    /// New URL.
    pub url: Option<String>,
    /// New username.
    pub user: Option<String>,
    /// New password (empty = keep).
    pub pass: Option<String>,
}

impl fmt::Debug for CredentialPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPatch")
            .field("site", &self.site)
            .field("url", &self.url)
            .field("user", &self.user)
            .field("pass", &self.pass.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Drop for CredentialPatch {
    fn drop(&mut self) {
        if let Some(ref mut p) = self.pass {
            p.zeroize();
        }
    }
}

/// Partial message update. `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePatch {
    /// New title.
    pub title: Option<String>,
    /// New body.
    pub body: Option<String>,
}

/// Partial link update. `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkPatch {
    /// New display name.
    pub name: Option<String>,
    /// New URL.
    pub url: Option<String>,
}

/// A set of fields that becomes a record once an id is minted.
pub trait Draft {
    /// Record type produced.
    type Output: Record;

    /// Attach `id`.
    fn into_record(self, id: String) -> Self::Output;
}

/// A partial update applicable to one record type.
pub trait Patch {
    /// Record type patched.
    type Target: Record;

    /// Merge the supplied fields into `target`.
    fn apply(self, target: &mut Self::Target);
}

impl Draft for CredentialDraft {
    type Output = Credential;

    fn into_record(mut self, id: String) -> Credential {
        Credential {
            id,
            site: std::mem::take(&mut self.site),
            url: std::mem::take(&mut self.url),
            user: std::mem::take(&mut self.user),
            pass: std::mem::take(&mut self.pass),
        }
    }
}

impl Draft for MessageDraft {
    type Output = Message;

    fn into_record(self, id: String) -> Message {
        Message {
            id,
            title: self.title,
            body: self.body,
        }
    }
}

impl Draft for LinkDraft {
    type Output = Link;

    fn into_record(self, id: String) -> Link {
        Link {
            id,
            name: self.name,
            url: self.url,
        }
    }
}

impl Patch for CredentialPatch {
    type Target = Credential;

    fn apply(mut self, target: &mut Credential) {
        if let Some(site) = self.site.take() {
            target.site = site;
        }
        if let Some(url) = self.url.take() {
            target.url = url;
        }
        if let Some(user) = self.user.take() {
            target.user = user;
        }
        if let Some(pass) = self.pass.take().filter(|p| !p.is_empty()) {
            target.pass.zeroize();
            target.pass = pass;
        }
    }
}

impl Patch for MessagePatch {
    type Target = Message;

    fn apply(self, target: &mut Message) {
        if let Some(title) = self.title {
            target.title = title;
        }
        if let Some(body) = self.body {
            target.body = body;
        }
    }
}

impl Patch for LinkPatch {
    type Target = Link;

    fn apply(self, target: &mut Link) {
        if let Some(name) = self.name {
            target.name = name;
        }
        if let Some(url) = self.url {
            target.url = url;
        }
    }
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Generate a random UUID v4 string.
pub(crate) fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);

    // Set version (4) and variant (RFC 4122).
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
