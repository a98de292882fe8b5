use crate::ipg::Ipg;
use crate::isa::Isa;
use crate::mapping::Mapping;
use crate::mia::MicroArchitecture;
use mia_utils::{Error, MiaResult};
use std::collections::BTreeSet;

/// Intermediate results passes hand to each other.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Artifact {
    Isa,
    Mia,
    StageOrder,
    Ipg,
    Mapping,
    Merged,
    Lowered,
    Named,
    Hazards,
    Inlined,
    Control,
}

impl Artifact {
    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Isa => "isa",
            Artifact::Mia => "microarchitecture",
            Artifact::StageOrder => "stage order",
            Artifact::Ipg => "instruction progress graph",
            Artifact::Mapping => "stage mapping",
            Artifact::Merged => "merged mapping",
            Artifact::Lowered => "lowered instruction progress graph",
            Artifact::Named => "name hints",
            Artifact::Hazards => "hazard analysis",
            Artifact::Inlined => "stage behaviors",
            Artifact::Control => "control logic",
        }
    }
}

/// State threaded through the synthesis passes.
#[derive(Debug, Default)]
pub struct Context {
    pub isa: Option<Isa>,
    pub mia: Option<MicroArchitecture>,
    pub ipg: Option<Ipg>,
    pub mapping: Option<Mapping>,
    /// Options given to passes, in the form `pass:opt=val`.
    pub extra_opts: Vec<String>,
    produced: BTreeSet<Artifact>,
}

impl Context {
    pub fn new(isa: Isa, mia: Option<MicroArchitecture>) -> Self {
        Self {
            isa: Some(isa),
            mia,
            ..Default::default()
        }
    }

    /// Whether `artifact` is available.
    pub fn has(&self, artifact: Artifact) -> bool {
        match artifact {
            Artifact::Isa => self.isa.is_some(),
            Artifact::Mia => self.mia.is_some(),
            Artifact::StageOrder => {
                self.mia.as_ref().is_some_and(|m| !m.order.is_empty())
            }
            Artifact::Ipg => self.ipg.is_some(),
            Artifact::Mapping => self.mapping.is_some(),
            _ => self.produced.contains(&artifact),
        }
    }

    /// Record that a pass produced `artifact`.
    pub fn mark(&mut self, artifact: Artifact) {
        if self.produced.insert(artifact) {
            log::trace!("{} available", artifact.name());
        }
    }

    pub fn isa(&self) -> MiaResult<&Isa> {
        self.isa
            .as_ref()
            .ok_or_else(|| Error::missing_structure("no instruction set given"))
    }

    pub fn mia(&self) -> MiaResult<&MicroArchitecture> {
        self.mia
            .as_ref()
            .ok_or_else(|| Error::missing_structure("no microarchitecture given"))
    }

    pub fn ipg(&self) -> MiaResult<&Ipg> {
        required(self.ipg.as_ref(), Artifact::Ipg)
    }

    pub fn mapping(&self) -> MiaResult<&Mapping> {
        required(self.mapping.as_ref(), Artifact::Mapping)
    }

    /// Mutable access to the IPG and the mapping at the same time.
    pub fn ipg_and_mapping(&mut self) -> MiaResult<(&mut Ipg, &mut Mapping)> {
        match (self.ipg.as_mut(), self.mapping.as_mut()) {
            (Some(ipg), Some(mapping)) => Ok((ipg, mapping)),
            (None, _) => Err(missing(Artifact::Ipg)),
            (_, None) => Err(missing(Artifact::Mapping)),
        }
    }
}

fn missing(artifact: Artifact) -> Error {
    Error::internal(format!("{} has not been computed", artifact.name()))
}

fn required<T>(field: Option<&T>, artifact: Artifact) -> MiaResult<&T> {
    field.ok_or_else(|| missing(artifact))
}
