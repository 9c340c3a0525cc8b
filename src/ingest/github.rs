//! Reescrita de links `github.com/.../blob/...` para o arquivo bruto.

use reqwest::Url;

/// Host padrão dos arquivos brutos do GitHub.
pub const RAW_GITHUB_BASE: &str = "https://raw.githubusercontent.com";

/// Um arquivo apontado por um link de blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLink {
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub path: String,
}

impl BlobLink {
    /// `https://github.com/<o>/<r>/blob/<ref>/<path>` → `Some(BlobLink)`.
    pub fn parse(link: &str) -> Option<Self> {
        let url = Url::parse(link.trim()).ok()?;
        let host = url.host_str()?;
        if host != "github.com" && host != "www.github.com" {
            return None;
        }

        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [owner, repo, "blob", git_ref, path @ ..] if !path.is_empty() => Some(Self {
                owner: owner.to_string(),
                repo: repo.to_string(),
                git_ref: git_ref.to_string(),
                path: path.join("/"),
            }),
            _ => None,
        }
    }

    /// URL do arquivo bruto sob `raw_base`.
    pub fn raw_url(&self, raw_base: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            raw_base.trim_end_matches('/'),
            self.owner,
            self.repo,
            self.git_ref,
            self.path
        )
    }

    pub fn title(&self) -> String {
        format!("{}/{}: {}", self.owner, self.repo, self.path)
    }
}
