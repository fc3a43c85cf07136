//! Publish the output directory to a static hosting branch.
//!
//! The built tree is committed in a staging clone of the hosting branch and
//! pushed to `origin`. The output directory itself is never modified, and a
//! failed push (auth, network, non-fast-forward) is surfaced verbatim with
//! git's own message. No retries.

use std::fs;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8Path;

use crate::Paths;
use crate::error::DeployError;

pub const DEFAULT_BRANCH: &str = "gh-pages";

/// Push the contents of the output directory to `branch` on `origin`.
pub fn publish(paths: &Paths, branch: &str) -> Result<(), DeployError> {
    let dist = &paths.dist;
    if !dist.exists() || dist.read_dir_utf8()?.next().is_none() {
        return Err(DeployError::NothingToDeploy(dist.clone()));
    }

    let remote = remote_url(&paths.root)?;

    let stage = paths.cache.join("deploy");
    if stage.exists() {
        fs::remove_dir_all(&stage)?;
    }
    fs::create_dir_all(&stage)?;

    // Continue the branch's history when it already exists so the push is a
    // fast-forward; a fresh branch starts from scratch.
    let clone = Command::new("git")
        .args(["clone", "--branch", branch, "--single-branch", &remote, "."])
        .current_dir(&stage)
        .output()?;

    if clone.status.success() {
        // Drop the previous build, keep .git.
        for entry in stage.read_dir_utf8()? {
            let entry = entry?;
            if entry.file_name() == ".git" {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
        }
    } else {
        git(&stage, "init", &["init", "--initial-branch", branch])?;
        git(&stage, "remote", &["remote", "add", "origin", &remote])?;
    }

    copy_rec(dist, &stage)?;

    git(&stage, "add", &["add", "-A"])?;

    let status = git(&stage, "status", &["status", "--porcelain"])?;
    if status.trim().is_empty() {
        tracing::info!("output directory matches '{branch}', nothing to push");
        return Ok(());
    }

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    git(
        &stage,
        "commit",
        &[
            "-c",
            "user.name=karakuri",
            "-c",
            "user.email=karakuri@localhost",
            "commit",
            "-m",
            &format!("Update {stamp}"),
        ],
    )?;

    git(
        &stage,
        "push",
        &["push", "origin", &format!("HEAD:refs/heads/{branch}")],
    )?;

    eprintln!("Pushed {dist} to {branch}");

    Ok(())
}

fn remote_url(root: &Utf8Path) -> Result<String, DeployError> {
    let output = Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(root)
        .output()?;

    if !output.status.success() {
        return Err(DeployError::NoRemote);
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if url.is_empty() {
        return Err(DeployError::NoRemote);
    }

    Ok(url)
}

fn git(dir: &Utf8Path, op: &'static str, args: &[&str]) -> Result<String, DeployError> {
    let output = Command::new("git").args(args).current_dir(dir).output()?;

    if !output.status.success() {
        return Err(DeployError::Git {
            op,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn copy_rec(src: &Utf8Path, dst: &Utf8Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in src.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            copy_rec(entry.path(), &dst.join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }

    Ok(())
}
