use super::Plugin;

/// Prefix every invocation with `-c <entry>` for each configured entry.
pub fn config_prefix_plugin(entries: Vec<String>) -> Plugin {
    Plugin::spawn_args("config-prefix", move |args, _| {
        if entries.is_empty() {
            return Ok(args);
        }
        let mut prefixed = Vec::with_capacity(entries.len() * 2 + args.len());
        for entry in &entries {
            prefixed.push("-c".to_owned());
            prefixed.push(entry.clone());
        }
        prefixed.extend(args);
        Ok(prefixed)
    })
}
