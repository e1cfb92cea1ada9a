//! Reserved names, file suffixes and envelope tags for icer archives

/// Reserved entry holding the archive metadata record.
pub const META_KEY: &str = "meta";

/// Suffix of every entry file (`<root>/<name>.json`).
pub const ENTRY_SUFFIX: &str = "json";

/// Suffix of the side-file ownership manifest (`<root>/<name>.sidefiles`).
pub const OWNERSHIP_SUFFIX: &str = "sidefiles";

/// Suffix zip archives are normalized to.
pub const ZIP_SUFFIX: &str = "ice.zip";

/// Prefix of zip staging directories.
pub const STAGING_PREFIX: &str = "icer_";

/// Suffix of zip staging directories.
pub const STAGING_SUFFIX: &str = ".ice";

/// Prefix shared by every envelope tag key.
pub const TAG_PREFIX: &str = "ice/";

/// Envelope key naming the type of a generically encoded record.
pub const TAG_RECORD: &str = "ice/record";
/// Envelope key holding the fields of a generically encoded record.
pub const TAG_FIELDS: &str = "ice/fields";
/// Envelope key naming the type of a handler-intercepted record.
pub const TAG_HANDLER: &str = "ice/handler";
/// Envelope key holding base64 encoded bytes.
pub const TAG_BYTES: &str = "ice/bytes";
/// Envelope key holding a non-finite float (`nan`, `inf`, `-inf`).
pub const TAG_FLOAT: &str = "ice/float";
/// Envelope key wrapping a map whose keys collide with the tag prefix.
pub const TAG_MAP: &str = "ice/map";

/// Conventional handler record field holding the representation selector.
pub const FIELD_MODE: &str = "mode";
/// Conventional handler record field naming the owned side file.
pub const FIELD_FILE_UUID: &str = "file_uuid";
/// Conventional handler record field holding the payload CRC32C.
pub const FIELD_CRC32C: &str = "crc32c";

/// Indentation used for pretty-printed records (four spaces).
pub const PRETTY_INDENT: &[u8] = b"    ";
