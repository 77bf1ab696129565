// enkf_core/src/estimation/filters/ensrf_serial.rs

use nalgebra::DMatrix;
use rand::RngCore;

use crate::error::Result;
use crate::estimation::{AnalysisInput, AnalysisScheme, Tolerances};
use crate::linalg::EnsembleSplit;

/// Serial ensemble square-root filter: observations are assimilated one at a
/// time into an ensemble augmented with its observation estimates, so the
/// later observation rows are updated along with the state.
///
/// Only valid for diagonal R, which is the only form R takes here.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnsrfSerial {
    pub tolerances: Tolerances,
}

impl EnsrfSerial {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }
}

impl AnalysisScheme for EnsrfSerial {
    fn name(&self) -> &'static str {
        "ensrf_serial"
    }

    fn update(&self, input: &AnalysisInput<'_>, _rng: &mut dyn RngCore) -> Result<DMatrix<f64>> {
        let nx = input.state_dim();
        let ny = input.obs_dim();
        let ne = input.members();
        let dof = (ne - 1) as f64;

        let mut augmented = DMatrix::<f64>::zeros(nx + ny, ne);
        augmented.rows_mut(0, nx).copy_from(input.prior());
        augmented.rows_mut(nx, ny).copy_from(input.predicted());

        for (i, (&y, &r)) in input
            .observations()
            .iter()
            .zip(input.obs_variance().iter())
            .enumerate()
        {
            // Mean and deviations are recomputed from the updated ensemble
            // before every observation.
            let split = EnsembleSplit::new(&augmented);
            let row = nx + i;
            let hx_p = split.perturbations.row(row).clone_owned();

            let hp = &split.perturbations * hx_p.transpose() / dof;
            let innovation_variance = hx_p.norm_squared() / dof + r;
            let gain = hp / innovation_variance;
            let alpha = 1.0 / (1.0 + (r / innovation_variance).sqrt());

            let mean = &split.mean + &gain * (y - split.mean[row]);
            let perturbations = &split.perturbations - (gain * alpha) * hx_p;
            augmented = EnsembleSplit::recompose(&mean, perturbations);
        }

        Ok(augmented.rows(0, nx).into_owned())
    }
}
