use super::{connect_single, core_error, json_pretty, EXIT_SUCCESS};
use indexquake_core::{RunConfig, SchemaManager};
use indexquake_schema::book_index_schema;

pub fn run(config: &RunConfig, json: bool) -> Result<u8, String> {
    let pool = connect_single(config)?;
    let manager = SchemaManager::new(config.index_name(), config.namespace(), book_index_schema());
    let created = manager.ensure_index(&pool).map_err(core_error)?;

    if json {
        let payload = serde_json::json!({
            "index": manager.index().as_str(),
            "prefix": manager.namespace().index_prefix(),
            "created": created,
            "fields": manager.field_count(),
        });
        println!("{}", json_pretty(&payload)?);
    } else if created {
        println!(
            "created index {} over {} ({} fields)",
            manager.index(),
            manager.namespace().index_prefix(),
            manager.field_count()
        );
    } else {
        println!(
            "index {} already exists ({} fields)",
            manager.index(),
            manager.field_count()
        );
    }
    Ok(EXIT_SUCCESS)
}
