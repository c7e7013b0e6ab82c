use testrig_common::PhaseName;

/// Which parts of the run were requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseSelection {
    pub unit: bool,
    pub integration: bool,
    pub benchmark: bool,
    pub load: bool,
    pub coverage: bool,
}

impl PhaseSelection {
    pub fn all() -> Self {
        Self {
            unit: true,
            integration: true,
            benchmark: true,
            load: true,
            coverage: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.unit || self.integration || self.benchmark || self.load || self.coverage)
    }

    pub fn includes(&self, phase: PhaseName) -> bool {
        match phase {
            PhaseName::Unit => self.unit,
            PhaseName::Integration => self.integration,
            PhaseName::Benchmark => self.benchmark,
            PhaseName::Load => self.load,
        }
    }

    /// Selected phases in execution order.
    pub fn phases(&self) -> Vec<PhaseName> {
        PhaseName::ALL
            .into_iter()
            .filter(|p| self.includes(*p))
            .collect()
    }

    /// Whether setup has to start the dependent service and the service
    /// under test.
    pub fn needs_service(&self) -> bool {
        self.phases().iter().any(|p| p.requires_service())
    }
}

/// Selection plus the modifiers that shape runner invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub selection: PhaseSelection,
    /// Set when everything was requested; also turns on race detection for
    /// the unit phase.
    pub all: bool,
    pub race: bool,
    pub quick: bool,
    pub verbose: bool,
    pub package: Option<String>,
}

impl RunOptions {
    pub fn all() -> Self {
        Self {
            selection: PhaseSelection::all(),
            all: true,
            ..Default::default()
        }
    }

    pub fn with_selection(selection: PhaseSelection) -> Self {
        if selection.is_empty() {
            return Self::all();
        }
        Self {
            selection,
            ..Default::default()
        }
    }

    pub fn unit_race(&self) -> bool {
        self.race || self.all
    }

    pub fn integration_race(&self) -> bool {
        self.race
    }
}
