//! Usage: Browser launcher seam; the session hands the authorization URL to it.

use crate::shared::error::AppResult;
use std::process::Command;

pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> AppResult<()>;
}

/// Opens URLs with the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> AppResult<()> {
        open_browser_command(url)?
            .spawn()
            .map_err(|e| format!("INTERNAL_ERROR: failed to open browser: {e}"))?;
        Ok(())
    }
}

/// Does nothing; the caller shows the URL for manual opening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBrowser;

impl BrowserOpener for NoBrowser {
    fn open(&self, _url: &str) -> AppResult<()> {
        Ok(())
    }
}

fn open_browser_command(url: &str) -> AppResult<Command> {
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("rundll32.exe");
        // `explorer <url>` may open File Explorer for some URL shapes.
        cmd.arg("url.dll,FileProtocolHandler").arg(url);
        return Ok(cmd);
    }

    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("open");
        cmd.arg(url);
        return Ok(cmd);
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(url);
        return Ok(cmd);
    }

    #[allow(unreachable_code)]
    Err(format!("INTERNAL_ERROR: browser open is unsupported on this platform ({url})").into())
}
