//! Pad/link graph of the capture pipeline.
//!
//! ```text
//! sensor --> front --+--> back --+--> 3DNR video node
//!                    |           +--> scaler-P video node
//!                    +--> bayer video node
//!                    +--> scaler-C video node
//! ```
//!
//! Enabling or disabling a link updates the output capability sets the
//! per-frame dispatcher consults before routing a DMA request.

use bitflags::bitflags;

use crate::err::{FimcIsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pad {
    SensorSource,
    FrontSink,
    FrontSourceBack,
    FrontSourceBayer,
    FrontSourceScalerc,
    BackSink,
    BackSource3dnr,
    BackSourceScalerp,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FrontOutput: u32 {
        /// On-the-fly link into the back subdev.
        const BACK = 1 << 0;
        const BAYER = 1 << 1;
        const SCALERC = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BackOutput: u32 {
        const TDNR = 1 << 0;
        const SCALERP = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaGraph {
    sensor_linked: bool,
    front: FrontOutput,
    back: BackOutput,
}

enum LinkTarget {
    Sensor,
    Front(FrontOutput),
    Back(BackOutput),
}

impl MediaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every link enabled.
    pub fn default_pipeline() -> Self {
        Self {
            sensor_linked: true,
            front: FrontOutput::all(),
            back: BackOutput::all(),
        }
    }

    pub fn front(&self) -> FrontOutput {
        self.front
    }

    pub fn back(&self) -> BackOutput {
        self.back
    }

    pub fn sensor_linked(&self) -> bool {
        self.sensor_linked
    }

    /// Enable or disable the link between `local` and `remote`; `None` is a
    /// video node.
    pub fn link_setup(&mut self, local: Pad, remote: Option<Pad>, enable: bool) -> Result<()> {
        use Pad::*;

        let target = match (local, remote) {
            (SensorSource, Some(FrontSink)) | (FrontSink, Some(SensorSource)) => LinkTarget::Sensor,
            (FrontSourceBack, Some(BackSink)) | (BackSink, Some(FrontSourceBack)) => {
                LinkTarget::Front(FrontOutput::BACK)
            }
            (FrontSourceBayer, None) => LinkTarget::Front(FrontOutput::BAYER),
            (FrontSourceScalerc, None) => LinkTarget::Front(FrontOutput::SCALERC),
            (BackSource3dnr, None) => LinkTarget::Back(BackOutput::TDNR),
            (BackSourceScalerp, None) => LinkTarget::Back(BackOutput::SCALERP),
            _ => {
                error!("no link between {:?} and {:?}", local, remote);
                return Err(FimcIsError::InvalidArgument);
            }
        };

        match target {
            LinkTarget::Sensor => self.sensor_linked = enable,
            LinkTarget::Front(bit) => self.front.set(bit, enable),
            LinkTarget::Back(bit) => self.back.set(bit, enable),
        }
        debug!(
            "link {:?} -> {:?} {}",
            local,
            remote,
            if enable { "on" } else { "off" }
        );
        Ok(())
    }

    pub fn scc_enabled(&self) -> bool {
        self.front.contains(FrontOutput::SCALERC)
    }

    /// Scaler-P is only reachable through the front-to-back link.
    pub fn scp_enabled(&self) -> bool {
        self.front.contains(FrontOutput::BACK) && self.back.contains(BackOutput::SCALERP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pipeline_routes_everything() {
        let graph = MediaGraph::default_pipeline();
        assert!(graph.sensor_linked());
        assert!(graph.scc_enabled());
        assert!(graph.scp_enabled());
    }

    #[test]
    fn cutting_front_to_back_disables_scp() {
        let mut graph = MediaGraph::default_pipeline();
        graph
            .link_setup(Pad::BackSink, Some(Pad::FrontSourceBack), false)
            .unwrap();
        assert!(!graph.scp_enabled());
        assert!(graph.back().contains(BackOutput::SCALERP));
        assert!(graph.scc_enabled());
    }

    #[test]
    fn video_node_links() {
        let mut graph = MediaGraph::new();
        graph.link_setup(Pad::FrontSourceScalerc, None, true).unwrap();
        assert!(graph.scc_enabled());
        graph.link_setup(Pad::FrontSourceScalerc, None, false).unwrap();
        assert!(!graph.scc_enabled());
    }

    #[test]
    fn rejects_impossible_links() {
        let mut graph = MediaGraph::new();
        assert_eq!(
            graph.link_setup(Pad::SensorSource, Some(Pad::BackSink), true),
            Err(FimcIsError::InvalidArgument)
        );
        assert!(graph.link_setup(Pad::BackSink, None, true).is_err());
        assert_eq!(graph, MediaGraph::new());
    }
}
