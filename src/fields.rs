// src/fields.rs - Sibling fields the energy equation is coupled to

use crate::error::{Result, SolidifyError};
use crate::fem::quad4;
use crate::fem::QuadMesh;
use glam::DVec2;
use std::ops::{Add, Mul};

/// The three fields a solidification run couples together
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Energy,
    Concentration,
    Momentum,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Energy => "energy",
            FieldKind::Concentration => "concentration",
            FieldKind::Momentum => "momentum",
        }
    }
}

/// A field with its own discretization on the shared mesh
pub trait FieldSolver {
    fn kind(&self) -> FieldKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn initialize(&mut self, mesh: &QuadMesh) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// Advance the field by `dt`
    fn solve(&mut self, mesh: &QuadMesh, dt: f64) -> Result<()>;
}

pub type Initializer<T> = Box<dyn Fn(DVec2, f64) -> T + Send + Sync>;

/// Nodal field prescribed by a function of position and time.
///
/// Stands in for a concentration or momentum solver: `initialize` samples the
/// function at t = 0 and every `solve(dt)` resamples it at the new time.
pub struct NodalField<T> {
    kind: FieldKind,
    values: Vec<T>,
    initializer: Initializer<T>,
    time: f64,
    initialized: bool,
}

pub type NodalScalarField = NodalField<f64>;
pub type NodalVectorField = NodalField<DVec2>;

impl<T> NodalField<T>
where
    T: Copy + Default + Add<Output = T> + Mul<f64, Output = T>,
{
    pub fn new(kind: FieldKind, initializer: impl Fn(DVec2, f64) -> T + Send + Sync + 'static) -> Self {
        Self {
            kind,
            values: Vec::new(),
            initializer: Box::new(initializer),
            time: 0.0,
            initialized: false,
        }
    }

    pub fn uniform(kind: FieldKind, value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::new(kind, move |_, _| value)
    }

    /// Field whose nodal values are given directly; `solve` leaves them unchanged.
    pub fn from_nodal(kind: FieldKind, mesh: &QuadMesh, values: Vec<T>) -> Result<Self>
    where
        T: Send + Sync + 'static,
    {
        if values.len() != mesh.n_nodes() {
            return Err(SolidifyError::FieldSize {
                name: kind.as_str(),
                expected: mesh.n_nodes(),
                found: values.len(),
            });
        }
        let nodes = mesh.nodes().to_vec();
        let table = values.clone();
        let mut field = Self::new(kind, move |p, _| {
            nodes
                .iter()
                .position(|x| *x == p)
                .map(|i| table[i])
                .unwrap_or_default()
        });
        field.values = values;
        field.initialized = true;
        Ok(field)
    }

    fn sample(&mut self, mesh: &QuadMesh) {
        let time = self.time;
        self.values = mesh
            .nodes()
            .iter()
            .map(|p| (self.initializer)(*p, time))
            .collect();
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Nodal values; an error until the field is initialized
    pub fn values(&self) -> Result<&[T]> {
        if !self.initialized {
            return Err(SolidifyError::FieldNotInitialized(self.kind.as_str()));
        }
        Ok(&self.values)
    }

    /// Nodal values, checked to carry one value per node of `mesh`
    pub fn values_on(&self, mesh: &QuadMesh) -> Result<&[T]> {
        let values = self.values()?;
        if values.len() != mesh.n_nodes() {
            return Err(SolidifyError::FieldSize {
                name: self.kind.as_str(),
                expected: mesh.n_nodes(),
                found: values.len(),
            });
        }
        Ok(values)
    }

    pub fn element_values(&self, mesh: &QuadMesh, e: usize) -> Result<[T; quad4::NODES_PER_ELEMENT]> {
        let values = self.values_on(mesh)?;
        Ok(mesh.gather(e, values))
    }

    /// Interpolated value at an arbitrary point of the mesh
    pub fn point_value(&self, mesh: &QuadMesh, p: DVec2) -> Result<T> {
        let values = self.values_on(mesh)?;
        let (e, xi) = mesh.try_locate(p)?;
        let nodal = mesh.gather(e, values);
        Ok(quad4::shape_values(xi)
            .iter()
            .zip(nodal)
            .fold(T::default(), |acc, (n, v)| acc + v * *n))
    }
}

impl<T> FieldSolver for NodalField<T>
where
    T: Copy + Default + Add<Output = T> + Mul<f64, Output = T>,
{
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn initialize(&mut self, mesh: &QuadMesh) -> Result<()> {
        self.time = 0.0;
        self.sample(mesh);
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn solve(&mut self, mesh: &QuadMesh, dt: f64) -> Result<()> {
        if !self.initialized {
            return Err(SolidifyError::FieldNotInitialized(self.kind.as_str()));
        }
        self.time += dt;
        self.sample(mesh);
        Ok(())
    }
}

/// Read-only view of everything the energy equation reads besides its own state.
#[derive(Clone, Copy)]
pub struct CoupledFields<'a> {
    pub mesh: &'a QuadMesh,
    pub concentration: &'a NodalScalarField,
    pub velocity: &'a NodalVectorField,
}

impl<'a> CoupledFields<'a> {
    /// Fails on the first sibling field that is not ready or does not fit the mesh
    pub fn ensure_initialized(&self) -> Result<()> {
        self.concentration.values_on(self.mesh)?;
        self.velocity.values_on(self.mesh)?;
        Ok(())
    }
}
