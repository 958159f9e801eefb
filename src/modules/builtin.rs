//! Built-in modules, loaded unconditionally at boot.

use crate::context::{CliCommand, CliOption};

use super::descriptor::ModuleDescriptor;

const SYSTEM_VERSION: &str = "1.0.0";
const DATABASE_VERSION: &str = "1.0.0";

pub fn all() -> [fn() -> ModuleDescriptor; 2] {
    [system_module, database_module]
}

/// The system module: host version, root CLI options, and the `module`
/// management subcommand.
pub fn system_module() -> ModuleDescriptor {
    ModuleDescriptor::builder("system")
        .name("System")
        .version(SYSTEM_VERSION)
        .core("1.x")
        .description("System module of the host")
        .install(|_| {
            tracing::info!("run install [System {}]", SYSTEM_VERSION);
            Ok(())
        })
        .uninstall(|_| {
            tracing::info!("run uninstall [System {}]", SYSTEM_VERSION);
            Ok(())
        })
        .config(|_| {
            tracing::info!("run config [System {}]", SYSTEM_VERSION);
            Ok(())
        })
        .sync_hook("cli__core", |ctx| {
            ctx.set_version(SYSTEM_VERSION);
            ctx.add_root_option(CliOption::new("-d, --debug", "debug mode"));
            ctx.add_root_option(CliOption::new("-s, --silent", "silent mode"));
            ctx.add_root_option(CliOption::new("-c, --config <path>", "set config path"));
            Ok(())
        })
        .sync_hook("cli__module", |ctx| {
            ctx.register_command(CliCommand {
                name: "module".into(),
                alias: Some("m".into()),
                description:
                    "module manager, install, uninstall, upgrade, enable, disable modules."
                        .into(),
                arguments: vec!["<action>".into(), "<modules...>".into()],
                options: vec![
                    CliOption::new("-p, --proxy <proxy>", "add proxy for installing"),
                    CliOption::new("-r, --registry <registry>", "choose a registry for installing"),
                ],
            });
            Ok(())
        })
        .sync_hook("app__db_load", |ctx| {
            ctx.extend_output(ctx.input());
            ctx.push_output("append".into());
            Ok(())
        })
        .sync_hook("app__db_save", |_| {
            tracing::info!("run app__db_save [System {}]", SYSTEM_VERSION);
            Ok(())
        })
        .async_hook("app_async__data_export", |_| async {
            tracing::info!("run app_async__data_export [System {}]", SYSTEM_VERSION);
            Ok(())
        })
        .build()
}

/// The database module: entity-data phase hooks.
pub fn database_module() -> ModuleDescriptor {
    ModuleDescriptor::builder("database")
        .name("Database")
        .version(DATABASE_VERSION)
        .core("1.x")
        .description("Database module for entity data storage")
        .config(|_| Ok(()))
        .sync_hook("cli__core", |_| Ok(()))
        .sync_hook("app__db_init", |_| Ok(()))
        .sync_hook("app__db_load", |ctx| {
            ctx.push_output("database".into());
            Ok(())
        })
        .build()
}
