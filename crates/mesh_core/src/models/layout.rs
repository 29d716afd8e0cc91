//! Filesystem layout under a job's working directory.

use std::path::{Path, PathBuf};

use super::frame::FrameFormat;

/// Every path the orchestrator reads or writes for one job.
///
/// ```text
/// <work_dir>/frames/                 sampled frames
/// <work_dir>/frames_<fmt>/           optional converted frames
/// <work_dir>/logs/                   per-job log
/// <work_dir>/output/                 reconstruction output root
/// <work_dir>/output/<cache>/         tool-owned per-node outputs
/// <work_dir>/output/final/           collected artifacts
/// <work_dir>/output/<graph_file>     tool-saved stage graph
/// <work_dir>/output/pipeline_report.json
/// ```
#[derive(Debug, Clone)]
pub struct WorkLayout {
    pub work_dir: PathBuf,
    pub frames_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub final_dir: PathBuf,
    pub graph_file: PathBuf,
    pub report_file: PathBuf,
}

impl WorkLayout {
    pub fn new(work_dir: impl Into<PathBuf>, cache_dir_name: &str, graph_file_name: &str) -> Self {
        let work_dir = work_dir.into();
        let output_dir = work_dir.join("output");
        Self {
            frames_dir: work_dir.join("frames"),
            logs_dir: work_dir.join("logs"),
            cache_dir: output_dir.join(cache_dir_name),
            final_dir: output_dir.join("final"),
            graph_file: output_dir.join(graph_file_name),
            report_file: output_dir.join("pipeline_report.json"),
            output_dir,
            work_dir,
        }
    }

    /// Directory holding frames converted to `format`.
    pub fn converted_frames_dir(&self, format: FrameFormat) -> PathBuf {
        self.work_dir.join(format!("frames_{}", format.extension()))
    }

    /// Cache directory of one toolchain node, e.g. `<cache>/Texturing`.
    pub fn node_dir(&self, node: &str) -> PathBuf {
        self.cache_dir.join(node)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_documented_tree() {
        let layout = WorkLayout::new("/jobs/a", "MeshroomCache", "meshroom_graph.json");
        assert_eq!(layout.frames_dir, PathBuf::from("/jobs/a/frames"));
        assert_eq!(layout.cache_dir, PathBuf::from("/jobs/a/output/MeshroomCache"));
        assert_eq!(layout.final_dir, PathBuf::from("/jobs/a/output/final"));
        assert_eq!(layout.graph_file, PathBuf::from("/jobs/a/output/meshroom_graph.json"));
        assert_eq!(
            layout.node_dir("Texturing"),
            PathBuf::from("/jobs/a/output/MeshroomCache/Texturing")
        );
        assert_eq!(
            layout.converted_frames_dir(FrameFormat::Ppm),
            PathBuf::from("/jobs/a/frames_ppm")
        );
    }
}
