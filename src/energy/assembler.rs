use crate::error::{Result, SolidifyError};
use crate::fem::quad4::{ElementValues, NODES_PER_ELEMENT};
use crate::fields::CoupledFields;
use crate::material::MaterialConstants;
use crate::thermo::{PhaseStateEvaluator, StabilizationCalculator, ThermodynamicState};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::sync::Arc;
use tracing::trace;

const N: usize = NODES_PER_ELEMENT;

/// Nodal data of the energy unknown handed to the assembler
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    /// `h_n`
    pub enthalpy: &'a DVector<f64>,
    /// `hdot_n`
    pub rate: &'a DVector<f64>,
    /// Enthalpy of the previous step, used for `drho/dt`
    pub previous_enthalpy: &'a DVector<f64>,
    /// Step length; 0 disables the predictor and the density rate
    pub dt: f64,
    /// `gamma dt`, the weight of `K + N` in the system matrix
    pub implicit_weight: f64,
}

/// Matrices of one element
#[derive(Debug, Clone, PartialEq)]
pub struct ElementMatrices {
    pub mass: DMatrix<f64>,
    pub advection: DMatrix<f64>,
    pub diffusion: DMatrix<f64>,
    pub load: DVector<f64>,
}

impl ElementMatrices {
    fn zeros() -> Self {
        Self {
            mass: DMatrix::zeros(N, N),
            advection: DMatrix::zeros(N, N),
            diffusion: DMatrix::zeros(N, N),
            load: DVector::zeros(N),
        }
    }

    /// `M* = M + w (K + N)`
    pub fn system_matrix(&self, implicit_weight: f64) -> DMatrix<f64> {
        &self.mass + (&self.diffusion + &self.advection) * implicit_weight
    }

    /// `R = F - M hdot - (N + K) h`
    pub fn residual(&self, rate: &DVector<f64>, enthalpy: &DVector<f64>) -> DVector<f64> {
        &self.load - &self.mass * rate - (&self.advection + &self.diffusion) * enthalpy
    }
}

/// Global system of one step
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    pub mass: CsrMatrix<f64>,
    pub advection: CsrMatrix<f64>,
    pub diffusion: CsrMatrix<f64>,
    pub load: DVector<f64>,
    /// `M*`
    pub matrix: CsrMatrix<f64>,
    pub residual: DVector<f64>,
}

/// Builds the stabilized, theta-weighted energy equation element by element.
#[derive(Debug, Clone)]
pub struct EnergyAssembler {
    evaluator: PhaseStateEvaluator,
    stabilization: StabilizationCalculator,
}

impl EnergyAssembler {
    pub fn new(material: Arc<MaterialConstants>) -> Self {
        Self {
            evaluator: PhaseStateEvaluator::new(Arc::clone(&material)),
            stabilization: StabilizationCalculator::new(material),
        }
    }

    pub fn evaluator(&self) -> &PhaseStateEvaluator {
        &self.evaluator
    }

    pub fn stabilization(&self) -> &StabilizationCalculator {
        &self.stabilization
    }

    /// `M`, `N`, `K` and `F` of element `e`.
    pub fn element_matrices(
        &self,
        fields: &CoupledFields,
        input: &AssemblyInput,
        e: usize,
    ) -> Result<ElementMatrices> {
        let mesh = fields.mesh;
        let m = self.evaluator.material();
        let coords = mesh.element_coords(e);
        let values = ElementValues::reinit(&coords).ok_or_else(|| {
            SolidifyError::Config(format!("element {e} is degenerate"))
        })?;

        let dofs = mesh.element(e);
        let h: [f64; N] = dofs.map(|i| input.enthalpy[i]);
        let h_prev: [f64; N] = dofs.map(|i| input.previous_enthalpy[i]);
        let concentration = fields.concentration.element_values(mesh, e)?;
        let velocity = fields.velocity.element_values(mesh, e)?;

        let mut states = Vec::with_capacity(N);
        let mut previous_density = [0.0; N];
        for a in 0..N {
            states.push(self.evaluator.state(h[a], concentration[a])?);
            previous_density[a] = self.evaluator.density(h_prev[a], concentration[a])?;
        }
        let nodal = |pick: fn(&ThermodynamicState) -> f64| -> [f64; N] {
            std::array::from_fn(|a| pick(&states[a]))
        };
        let temperature = nodal(|s| s.temperature);
        let fraction = nodal(|s| s.liquid_mass_fraction);
        let epsilon = nodal(|s| s.epsilon);
        let density = nodal(|s| s.density);

        // gradients of an element-uniform field come out exactly zero
        let temperature_dev = about_mean(&temperature);
        let fraction_dev = about_mean(&fraction);
        let h_dev = about_mean(&h);

        let element_length = self.stabilization.element_length(&coords, &velocity);
        let cf = m.specific_heat_fluid;
        let cs = m.specific_heat_solid;

        let mut out = ElementMatrices::zeros();
        for (qp, pv) in values.points.iter().enumerate() {
            let jxw = values.jxw[qp];
            let v = pv.vector(&velocity);
            let t = pv.value(&temperature);
            let f = pv.value(&fraction);
            let eps = pv.value(&epsilon);
            let rho = pv.value(&density);
            let rho_old = pv.value(&previous_density);
            let grad_t = pv.gradient(&temperature_dev);
            let grad_f = pv.gradient(&fraction_dev);
            let grad_h = pv.gradient(&h_dev);

            let drho_dt = if input.dt > 0.0 { (rho - rho_old) / input.dt } else { 0.0 };
            let stab = self.stabilization.state(element_length, v, rho, eps, f, grad_t, grad_h);
            let conductivity = self.evaluator.conductivity(eps);
            let latent = (cf - cs) * (t - m.eutectic_temperature) + m.latent_heat;
            let source = rho * (1.0 - f) * (cf - cs) * grad_t.dot(v)
                + rho * grad_f.dot(v) * latent
                + drho_dt * (1.0 - f) * latent;

            let advect: [f64; N] = std::array::from_fn(|j| v.dot(pv.gradients[j]));
            for i in 0..N {
                let d = if f > 0.0 {
                    stab.tau1 * advect[i] / f
                        - stab.tau1 / rho * drho_dt * (1.0 - f) / f * pv.shape[i]
                } else {
                    0.0
                };
                let test = pv.shape[i] + d;
                for j in 0..N {
                    out.mass[(i, j)] += jxw * rho * test * pv.shape[j];
                    out.advection[(i, j)] += jxw * rho * test * advect[j];
                    out.diffusion[(i, j)] += jxw
                        * conductivity
                        * stab.alpha
                        * pv.gradients[i].dot(pv.gradients[j]);
                }
                out.load[i] += jxw * test * source;
            }
            trace!(element = e, qp, tau1 = stab.tau1, alpha = stab.alpha, "energy quadrature point");
        }
        Ok(out)
    }

    /// Assemble every element into the global `M`, `N`, `K`, `F`, `M*` and `R`.
    pub fn assemble(&self, fields: &CoupledFields, input: &AssemblyInput) -> Result<AssembledSystem> {
        let mesh = fields.mesh;
        let n = mesh.n_dofs();
        for (name, v) in [
            ("enthalpy", input.enthalpy),
            ("enthalpy_rate", input.rate),
            ("previous_enthalpy", input.previous_enthalpy),
        ] {
            if v.len() != n {
                return Err(SolidifyError::FieldSize {
                    name,
                    expected: n,
                    found: v.len(),
                });
            }
        }

        let mut mass = CooMatrix::new(n, n);
        let mut advection = CooMatrix::new(n, n);
        let mut diffusion = CooMatrix::new(n, n);
        let mut matrix = CooMatrix::new(n, n);
        let mut load = DVector::zeros(n);
        let mut residual = DVector::zeros(n);

        for e in 0..mesh.n_elements() {
            let local = self.element_matrices(fields, input, e)?;
            let dofs = mesh.element(e);

            let h_local = DVector::from_fn(N, |a, _| input.enthalpy[dofs[a]]);
            let rate_local = DVector::from_fn(N, |a, _| input.rate[dofs[a]]);
            let predicted = &h_local + &rate_local * input.dt;
            let system = local.system_matrix(input.implicit_weight);
            let r = local.residual(&rate_local, &predicted);

            for (i, &gi) in dofs.iter().enumerate() {
                load[gi] += local.load[i];
                residual[gi] += r[i];
                for (j, &gj) in dofs.iter().enumerate() {
                    mass.push(gi, gj, local.mass[(i, j)]);
                    advection.push(gi, gj, local.advection[(i, j)]);
                    diffusion.push(gi, gj, local.diffusion[(i, j)]);
                    matrix.push(gi, gj, system[(i, j)]);
                }
            }
        }

        Ok(AssembledSystem {
            mass: CsrMatrix::from(&mass),
            advection: CsrMatrix::from(&advection),
            diffusion: CsrMatrix::from(&diffusion),
            load,
            matrix: CsrMatrix::from(&matrix),
            residual,
        })
    }
}

fn about_mean(values: &[f64; N]) -> [f64; N] {
    let mean = values.iter().sum::<f64>() / N as f64;
    values.map(|v| v - mean)
}

/// Dense copy of a global matrix, for inspection
pub fn to_dense(a: &CsrMatrix<f64>) -> DMatrix<f64> {
    let mut dense = DMatrix::zeros(a.nrows(), a.ncols());
    for (i, j, v) in a.triplet_iter() {
        dense[(i, j)] += *v;
    }
    dense
}
