use super::{connect_single, json_pretty, EXIT_SUCCESS};
use indexquake_core::RunConfig;

pub fn run(config: &RunConfig, json: bool) -> Result<u8, String> {
    let pool = connect_single(config)?;
    let info = pool
        .acquire()
        .and_then(|mut conn| conn.index_info(config.index_name().as_str()))
        .map_err(|e| format!("store error: {e}"))?;

    if json {
        println!("{}", json_pretty(&info)?);
    } else {
        println!("index:       {}", info.name);
        println!("documents:   {}", info.num_docs);
        println!("prefixes:    {}", info.prefixes.join(", "));
        println!("attributes:  {}", info.attributes.len());
        for attr in &info.attributes {
            println!("  {:<28} {:<8} {}", attr.alias, attr.kind, attr.identifier);
        }
    }
    Ok(EXIT_SUCCESS)
}
