use serde::Deserialize;

/// A merge request's number and the commit at the tip of its diff.
///
/// Built from a detail record with a non-empty head SHA; once handed to a
/// sink it is never revisited in the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestRef {
    /// Instance-wide identifier (not shown in the UI)
    pub id: u64,
    /// Project-scoped number, as shown in the UI (`!42`)
    pub iid: u64,
    /// Head commit of the merge request's diff
    pub head_sha: String,
}

/// Item of `GET projects/:id/merge_requests`; only the number is needed to
/// look up the detail record.
#[derive(Debug, Deserialize)]
pub struct MergeRequestSummary {
    pub iid: u64,
}

/// Body of `GET projects/:id/merge_requests/:iid`.
#[derive(Debug, Deserialize)]
pub struct MergeRequestDetail {
    pub id: u64,
    pub iid: u64,
    #[serde(default)]
    pub diff_refs: Option<DiffRefs>,
}

/// Commits bounding the diff; only the head is exported.
#[derive(Debug, Deserialize)]
pub struct DiffRefs {
    #[serde(default)]
    pub head_sha: Option<String>,
}

impl MergeRequestDetail {
    /// Head SHA of the diff, `None` when GitLab has not computed diff refs.
    pub fn head_sha(&self) -> Option<&str> {
        self.diff_refs
            .as_ref()
            .and_then(|refs| refs.head_sha.as_deref())
            .filter(|sha| !sha.is_empty())
    }

    pub fn into_ref(self) -> Option<MergeRequestRef> {
        let head_sha = self.head_sha()?.to_owned();
        Some(MergeRequestRef {
            id: self.id,
            iid: self.iid,
            head_sha,
        })
    }
}
