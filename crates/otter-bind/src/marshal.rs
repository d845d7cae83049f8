//! Conversion of change sets into script values

use crate::change_set::{CollectionChangeSet, IndexSet};
use crate::engine::ScriptEngine;
use crate::error::BindResult;

/// Ascending array of the positions in `indices`
pub fn index_array<E: ScriptEngine>(ctx: &E::Context, indices: &IndexSet) -> BindResult<E::Value> {
    let values: Vec<E::Value> = indices
        .as_indexes()
        .map(|index| E::from_number(ctx, index as f64))
        .collect();
    let array = E::create_array(ctx, &values)?;
    Ok(E::from_object(ctx, &array))
}

/// Script object `{ deletions, insertions, modifications }`
///
/// Modifications are reported at their pre-change positions.
pub fn create_collection_change_set<E: ScriptEngine>(
    ctx: &E::Context,
    changes: &CollectionChangeSet,
) -> BindResult<E::Object> {
    let object = E::create_empty_object(ctx);
    for (name, indices) in [
        ("deletions", &changes.deletions),
        ("insertions", &changes.insertions),
        ("modifications", &changes.modifications),
    ] {
        E::set_property(ctx, &object, name, &index_array::<E>(ctx, indices)?)?;
    }
    Ok(object)
}
