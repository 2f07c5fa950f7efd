// src/commands.rs
//! Command handlers for the quarry CLI

use anyhow::Result;
use quarry::{
    Pool, RefreshPolicy, RepoInfo, RepoManager, RepoManagerOptions, ServiceInfo, ServiceType,
};
use std::path::Path;
use tracing::{info, warn};

fn manager(root: &str) -> Result<RepoManager> {
    let options = RepoManagerOptions::for_root(root);
    Ok(RepoManager::new(options)?)
}

pub fn cmd_repo_add(
    alias: &str,
    url: &str,
    root: &str,
    name: Option<String>,
    priority: Option<u32>,
    disabled: bool,
) -> Result<()> {
    let manager = manager(root)?;

    let mut repo = RepoInfo::new(alias);
    repo.set_base_url(url);
    repo.name = name.unwrap_or_else(|| alias.to_string());
    repo.enabled = !disabled;
    if let Some(priority) = priority {
        repo.priority = priority;
    }

    manager.add_repository(&repo)?;
    println!("Added repository '{alias}' ({url})");
    Ok(())
}

pub fn cmd_repo_list(root: &str) -> Result<()> {
    let manager = manager(root)?;
    let repos = manager.list_repos()?;
    if repos.is_empty() {
        println!("No repositories defined");
        return Ok(());
    }

    println!(
        "{:<20} {:<8} {:<11} {:<9} {}",
        "Alias", "Enabled", "Autorefresh", "Priority", "URL"
    );
    for repo in repos {
        println!(
            "{:<20} {:<8} {:<11} {:<9} {}",
            repo.alias(),
            if repo.enabled { "yes" } else { "no" },
            if repo.autorefresh { "yes" } else { "no" },
            repo.priority,
            repo.primary_url().unwrap_or("-"),
        );
    }
    Ok(())
}

pub fn cmd_repo_remove(alias: &str, root: &str) -> Result<()> {
    let manager = manager(root)?;
    manager.remove_repository(alias)?;
    println!("Removed repository '{alias}'");
    Ok(())
}

pub fn cmd_repo_enable(alias: &str, root: &str, enabled: bool) -> Result<()> {
    let manager = manager(root)?;
    let mut repo = manager
        .find_repo(alias)?
        .ok_or_else(|| quarry::Error::NotFound(alias.to_string()))?;
    repo.enabled = enabled;
    manager.modify_repository(alias, &repo)?;
    println!(
        "Repository '{alias}' {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn cmd_repo_import(file: &str, root: &str) -> Result<()> {
    let manager = manager(root)?;
    let imported = manager.add_repositories_from_file(Path::new(file))?;
    for repo in &imported {
        println!("Imported repository '{}'", repo.alias());
    }
    println!("Imported {} repositories from {file}", imported.len());
    Ok(())
}

pub fn cmd_refresh(alias: Option<String>, root: &str, force: bool, build: bool) -> Result<()> {
    let manager = manager(root)?;
    let policy = if force {
        RefreshPolicy::Forced
    } else {
        RefreshPolicy::IfNeeded
    };

    let repos = match alias {
        Some(alias) => vec![manager
            .find_repo(&alias)?
            .ok_or_else(|| quarry::Error::NotFound(alias.clone()))?],
        None => manager.list_repos()?,
    };

    let mut failed = None;
    for mut repo in repos {
        if !repo.enabled {
            info!("skipping disabled repository '{}'", repo.alias());
            continue;
        }
        let result = if build {
            manager.build_cache(&mut repo, policy)
        } else {
            manager.refresh_metadata(&mut repo, policy)
        };
        match result {
            Ok(()) => println!("Refreshed '{}'", repo.alias()),
            Err(e) => {
                warn!("refresh of '{}' failed: {e}", repo.alias());
                failed = Some(e);
            }
        }
    }

    match failed {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

pub fn cmd_clean_cache(alias: Option<String>, root: &str) -> Result<()> {
    let manager = manager(root)?;
    let repos = match alias {
        Some(alias) => vec![manager
            .find_repo(&alias)?
            .ok_or_else(|| quarry::Error::NotFound(alias.clone()))?],
        None => manager.list_repos()?,
    };
    for repo in repos {
        manager.clean_cache(&repo)?;
        println!("Cleaned cache of '{}'", repo.alias());
    }
    Ok(())
}

pub fn cmd_load(alias: &str, root: &str) -> Result<()> {
    let manager = manager(root)?;
    let mut repo = manager
        .find_repo(alias)?
        .ok_or_else(|| quarry::Error::NotFound(alias.to_string()))?;

    let mut pool = Pool::new();
    manager.load_repo(&mut repo, &mut pool)?;

    let loaded = pool
        .repo(alias)
        .map(|r| r.solvable_count())
        .unwrap_or(0);
    println!("Loaded '{alias}': {loaded} solvables");
    Ok(())
}

pub fn cmd_service_add(alias: &str, url: &str, root: &str, service_type: &str) -> Result<()> {
    let manager = manager(root)?;
    let mut service = ServiceInfo::new(alias, url);
    service.service_type = service_type.parse::<ServiceType>()?;
    manager.add_service(&service)?;
    println!("Added service '{alias}' ({url})");
    Ok(())
}

pub fn cmd_service_list(root: &str) -> Result<()> {
    let manager = manager(root)?;
    let services = manager.list_services()?;
    if services.is_empty() {
        println!("No services defined");
        return Ok(());
    }

    println!("{:<20} {:<8} {:<13} {}", "Alias", "Enabled", "Type", "URL");
    for service in services {
        println!(
            "{:<20} {:<8} {:<13} {}",
            service.alias(),
            if service.enabled { "yes" } else { "no" },
            service.service_type,
            service.url,
        );
    }
    Ok(())
}

pub fn cmd_service_remove(alias: &str, root: &str) -> Result<()> {
    let manager = manager(root)?;
    manager.remove_service(alias)?;
    println!("Removed service '{alias}'");
    Ok(())
}

pub fn cmd_service_refresh(root: &str) -> Result<()> {
    let manager = manager(root)?;
    let report = manager.refresh_services()?;
    if report.is_ok() {
        println!("Refreshed all services");
        Ok(())
    } else {
        for (subject, error) in &report.errors {
            eprintln!("'{subject}': {error}");
        }
        anyhow::bail!("{} failures during service refresh", report.errors.len());
    }
}
