//! `ice` and `deice`: store named values in an archive and read them back

use std::collections::BTreeMap;

use icer_codec::{Decoder, Encoder, Revivers};
use icer_format::constants::META_KEY;
use icer_format::{validate_name, IceError, Result, Value};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::archive::Archive;
use crate::meta::{encode_meta, Metadata};

/// What an `ice` call wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IceSummary {
    /// Entry names written, in call order (duplicates collapsed)
    pub names: Vec<String>,
    /// Number of side files written by handlers
    pub side_files: usize,
}

impl IceSummary {
    /// Number of entries written
    pub fn entries(&self) -> usize {
        self.names.len()
    }
}

/// Store `values` in `archive` under their names.
///
/// Writes the `meta` entry first (caller `meta` merged over the defaults),
/// then each value in order. A name that already exists is removed together
/// with its side files before the new value is written. A later duplicate
/// name within one call replaces the earlier value.
///
/// Not transactional: entries written before a failure stay written.
pub fn ice<I, K>(archive: &dyn Archive, meta: Option<&Map<String, JsonValue>>, values: I) -> Result<IceSummary>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    if !archive.mode().is_writable() {
        return Err(IceError::read_only("ice values"));
    }

    let metadata = Metadata::now(archive.handlers()).to_json(meta)?;
    let meta_text = encode_meta(&metadata, archive.options().encode.pretty)?;
    archive.save(META_KEY, &meta_text)?;

    let session = archive.handlers().open_session(archive.side_files())?;
    let encoder = Encoder::new(&session).with_options(archive.options().encode.clone());

    let mut summary = IceSummary::default();
    for (name, value) in values {
        let name: String = name.into();
        validate_name(&name)?;
        if name == META_KEY {
            return Err(IceError::ReservedName { name });
        }

        if archive.contains(&name)? {
            debug!(entry = %name, "replacing existing entry");
            archive.remove(&name)?;
        }

        let encoded = encoder.encode(&value)?;
        archive.save_owned(&name, &encoded.text, &encoded.side_files)?;
        debug!(entry = %name, side_files = encoded.side_files.len(), "entry written");

        summary.side_files += encoded.side_files.len();
        if !summary.names.contains(&name) {
            summary.names.push(name);
        }
    }
    session.close();

    info!(
        kind = %archive.kind(),
        entries = summary.entries(),
        side_files = summary.side_files,
        "iced values"
    );
    Ok(summary)
}

/// Read entries back from `archive`.
///
/// `keys` of `None` (or empty) means every entry except `meta`. `classes`
/// revives records that were written without a handler.
pub fn deice(
    archive: &dyn Archive,
    keys: Option<&[&str]>,
    classes: Option<&Revivers>,
) -> Result<BTreeMap<String, Value>> {
    let names: Vec<String> = match keys {
        Some(keys) if !keys.is_empty() => keys.iter().map(|k| k.to_string()).collect(),
        _ => archive
            .keys()?
            .into_iter()
            .filter(|k| k != META_KEY)
            .collect(),
    };

    let session = archive.handlers().open_session(archive.side_files())?;
    let decoder = Decoder::new(&session)
        .with_revivers(classes)
        .with_limits(archive.options().limits().clone());

    let mut out = BTreeMap::new();
    for name in names {
        let text = archive.read(&name)?;
        let value = decoder.decode_str(&text)?;
        out.insert(name, value);
    }
    session.close();

    info!(kind = %archive.kind(), entries = out.len(), "deiced values");
    Ok(out)
}
