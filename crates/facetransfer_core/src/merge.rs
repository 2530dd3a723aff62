//! Face transplant between two actor records.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::actor::{ActorRecord, FACE_BIT, FEMALE_BIT, FieldKey, FieldValue, facial_keys};
use crate::changeform::ChangeFlags;
use crate::error::{CoreError, Result};
use crate::refid::FormContext;
use crate::save::SaveFile;

/// Which record supplies the `female` byte and its flag bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderSource {
    /// Keep the target's gender. Race and sex are not part of the face.
    #[default]
    Target,
    Source,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub gender_from: GenderSource,
}

/// [`merge_with`] using default options.
pub fn merge(
    source: &ActorRecord,
    source_flags: ChangeFlags,
    target: &ActorRecord,
    target_flags: ChangeFlags,
    target_ctx: &FormContext<'_>,
) -> Result<(ActorRecord, ChangeFlags)> {
    merge_with(
        source,
        source_flags,
        target,
        target_flags,
        target_ctx,
        MergeOptions::default(),
    )
}

/// Copies the source's facial group over the target.
///
/// Every transplanted reference is re-expressed against `target_ctx`, so a
/// face that needs a plugin the target does not load fails here, before
/// any bytes are produced. The returned flags are `target_flags` with the
/// facial bit set iff the result carries a face.
pub fn merge_with(
    source: &ActorRecord,
    source_flags: ChangeFlags,
    target: &ActorRecord,
    target_flags: ChangeFlags,
    target_ctx: &FormContext<'_>,
    options: MergeOptions,
) -> Result<(ActorRecord, ChangeFlags)> {
    if source.game != target.game {
        return Err(CoreError::IncompatibleCharacters {
            reason: format!("{} actor cannot donate to a {} actor", source.game, target.game),
        });
    }

    let mut merged = target.clone();
    for key in facial_keys(source.game) {
        if let Some(value) = source.get(key) {
            let rebound = value.try_map_refs(|r| target_ctx.rebind(r))?;
            merged.insert(key, rebound);
        }
    }

    let mut flags = target_flags.with(FACE_BIT, merged.has_face());

    if options.gender_from == GenderSource::Source {
        match source.get(FieldKey::Female) {
            Some(value) => {
                merged.insert(FieldKey::Female, value.clone());
            }
            None => {
                merged.remove(FieldKey::Female);
            }
        }
        let female = source_flags.bit(FEMALE_BIT) && merged.contains(FieldKey::Female);
        flags = flags.with(FEMALE_BIT, female);
    }

    debug!(
        "merged face: {} facial fields, flags {} -> {}",
        facial_keys(merged.game).filter(|k| merged.contains(*k)).count(),
        target_flags,
        flags
    );
    Ok((merged, flags))
}

/// Fails with `IncompatibleCharacters` unless both saves come from the same
/// game and their players share sex and race.
pub fn check_compatible(source: &SaveFile, target: &SaveFile) -> Result<()> {
    if source.game != target.game {
        return Err(CoreError::IncompatibleCharacters {
            reason: format!("not from the same game ({} vs {})", source.game, target.game),
        });
    }
    let (s, t) = (&source.header, &target.header);
    if s.player_sex != t.player_sex {
        return Err(CoreError::IncompatibleCharacters {
            reason: format!(
                "characters differ in sex ({} vs {})",
                s.player_sex, t.player_sex
            ),
        });
    }
    if s.race_editor_id != t.race_editor_id {
        return Err(CoreError::IncompatibleCharacters {
            reason: format!(
                "characters differ in race ({} vs {})",
                s.race_editor_id, t.race_editor_id
            ),
        });
    }
    Ok(())
}

/// The facial fields of `record` as `(key, value)` pairs in wire order.
pub fn facial_fields(record: &ActorRecord) -> Vec<(FieldKey, &FieldValue)> {
    facial_keys(record.game)
        .filter_map(|k| record.get(k).map(|v| (k, v)))
        .collect()
}
