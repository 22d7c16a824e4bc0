//! Tabulated nodes and weights for the nested Gauss-Patterson rules.
//!
//! Level `l` has `2^(l+1) - 1` nodes; each level is a full interpolatory rule
//! on `[-1, 1]` that reuses every node of the previous level. The abscissas and
//! weights below were generated offline from the exact Stieltjes-extension
//! construction and are accurate to the last printed digit.

/// Highest tabulated Gauss-Patterson level.
pub const GP_MAX_LEVEL: u32 = 5;

/// Number of nodes in the level `level` rule.
pub fn gp_num_nodes(level: u32) -> usize
{
    (1usize << (level + 1)) - 1
}

static GP_NODES_0: [f64; 1] = [
    0.00000000000000000e+00,
];
static GP_WEIGHTS_0: [f64; 1] = [
    2.00000000000000000e+00,
];

static GP_NODES_1: [f64; 3] = [
    -7.74596669241483404e-01, 0.00000000000000000e+00, 7.74596669241483404e-01,
];
static GP_WEIGHTS_1: [f64; 3] = [
    5.55555555555555580e-01, 8.88888888888888840e-01, 5.55555555555555580e-01,
];

static GP_NODES_2: [f64; 7] = [
    -9.60491268708020263e-01, -7.74596669241483404e-01, -4.34243749346802543e-01,
    0.00000000000000000e+00, 4.34243749346802543e-01, 7.74596669241483404e-01,
    9.60491268708020263e-01,
];
static GP_WEIGHTS_2: [f64; 7] = [
    1.04656226026467264e-01, 2.68488089868333446e-01, 4.01397414775962247e-01,
    4.50916538658474142e-01, 4.01397414775962247e-01, 2.68488089868333446e-01,
    1.04656226026467264e-01,
];

static GP_NODES_3: [f64; 15] = [
    -9.93831963212755021e-01, -9.60491268708020263e-01, -8.88459232872257032e-01,
    -7.74596669241483404e-01, -6.21102946737226436e-01, -4.34243749346802543e-01,
    -2.23386686428966891e-01, 0.00000000000000000e+00, 2.23386686428966891e-01,
    4.34243749346802543e-01, 6.21102946737226436e-01, 7.74596669241483404e-01,
    8.88459232872257032e-01, 9.60491268708020263e-01, 9.93831963212755021e-01,
];
static GP_WEIGHTS_3: [f64; 15] = [
    1.70017196299402616e-02, 5.16032829970797385e-02, 9.29271953151245417e-02,
    1.34415255243784226e-01, 1.71511909136391388e-01, 2.00628529376989023e-01,
    2.19156858401587495e-01, 2.25510499798206698e-01, 2.19156858401587495e-01,
    2.00628529376989023e-01, 1.71511909136391388e-01, 1.34415255243784226e-01,
    9.29271953151245417e-02, 5.16032829970797385e-02, 1.70017196299402616e-02,
];

static GP_NODES_4: [f64; 31] = [
    -9.99098124967667589e-01, -9.93831963212755021e-01, -9.81531149553740101e-01,
    -9.60491268708020263e-01, -9.29654857429740078e-01, -8.88459232872257032e-01,
    -8.36725938168868755e-01, -7.74596669241483404e-01, -7.02496206491527109e-01,
    -6.21102946737226436e-01, -5.31319743644375619e-01, -4.34243749346802543e-01,
    -3.31135393257976807e-01, -2.23386686428966891e-01, -1.12488943133186622e-01,
    0.00000000000000000e+00, 1.12488943133186622e-01, 2.23386686428966891e-01,
    3.31135393257976807e-01, 4.34243749346802543e-01, 5.31319743644375619e-01,
    6.21102946737226436e-01, 7.02496206491527109e-01, 7.74596669241483404e-01,
    8.36725938168868755e-01, 8.88459232872257032e-01, 9.29654857429740078e-01,
    9.60491268708020263e-01, 9.81531149553740101e-01, 9.93831963212755021e-01,
    9.99098124967667589e-01,
];
static GP_WEIGHTS_4: [f64; 31] = [
    2.54478079156187460e-03, 8.43456573932110584e-03, 1.64460498543878113e-02,
    2.58075980961766545e-02, 3.59571033071293192e-02, 4.64628932617579885e-02,
    5.69795094941233579e-02, 6.72077542959906987e-02, 7.68796204990035287e-02,
    8.57559200499903446e-02, 9.36271099812644725e-02, 1.00314278611795579e-01,
    1.05669893580234805e-01, 1.09578421055924635e-01, 1.11956873020953460e-01,
    1.12755256720768693e-01, 1.11956873020953460e-01, 1.09578421055924635e-01,
    1.05669893580234805e-01, 1.00314278611795579e-01, 9.36271099812644725e-02,
    8.57559200499903446e-02, 7.68796204990035287e-02, 6.72077542959906987e-02,
    5.69795094941233579e-02, 4.64628932617579885e-02, 3.59571033071293192e-02,
    2.58075980961766545e-02, 1.64460498543878113e-02, 8.43456573932110584e-03,
    2.54478079156187460e-03,
];

static GP_NODES_5: [f64; 63] = [
    -9.99872888120357572e-01, -9.99098124967667589e-01, -9.97206259372221959e-01,
    -9.93831963212755021e-01, -9.88684757547429460e-01, -9.81531149553740101e-01,
    -9.72182874748581782e-01, -9.60491268708020263e-01, -9.46342858373402929e-01,
    -9.29654857429740078e-01, -9.10371156957004324e-01, -8.88459232872257032e-01,
    -8.63907938193690494e-01, -8.36725938168868755e-01, -8.06940531950217643e-01,
    -7.74596669241483404e-01, -7.39756044352694708e-01, -7.02496206491527109e-01,
    -6.62909660024780578e-01, -6.21102946737226436e-01, -5.77195710052045841e-01,
    -5.31319743644375619e-01, -4.83618026945841051e-01, -4.34243749346802543e-01,
    -3.83359324198730367e-01, -3.31135393257976807e-01, -2.77749822021824300e-01,
    -2.23386686428966891e-01, -1.68235251552207477e-01, -1.12488943133186622e-01,
    -5.63443130465927922e-02, 0.00000000000000000e+00, 5.63443130465927922e-02,
    1.12488943133186622e-01, 1.68235251552207477e-01, 2.23386686428966891e-01,
    2.77749822021824300e-01, 3.31135393257976807e-01, 3.83359324198730367e-01,
    4.34243749346802543e-01, 4.83618026945841051e-01, 5.31319743644375619e-01,
    5.77195710052045841e-01, 6.21102946737226436e-01, 6.62909660024780578e-01,
    7.02496206491527109e-01, 7.39756044352694708e-01, 7.74596669241483404e-01,
    8.06940531950217643e-01, 8.36725938168868755e-01, 8.63907938193690494e-01,
    8.88459232872257032e-01, 9.10371156957004324e-01, 9.29654857429740078e-01,
    9.46342858373402929e-01, 9.60491268708020263e-01, 9.72182874748581782e-01,
    9.81531149553740101e-01, 9.88684757547429460e-01, 9.93831963212755021e-01,
    9.97206259372221959e-01, 9.99098124967667589e-01, 9.99872888120357572e-01,
];
static GP_WEIGHTS_5: [f64; 63] = [
    3.63221481845530650e-04, 1.26515655623006800e-03, 2.57904979468568827e-03,
    4.21763044155885457e-03, 6.11550682211724640e-03, 8.22300795723593034e-03,
    1.04982469096213220e-02, 1.29038001003512655e-02, 1.54067504665594979e-02,
    1.79785515681282690e-02, 2.05942339159127102e-02, 2.32314466399102700e-02,
    2.58696793272147479e-02, 2.84897547458335502e-02, 3.10735511116879658e-02,
    3.36038771482077281e-02, 3.60644327807825710e-02, 3.84398102494555305e-02,
    4.07155101169443187e-02, 4.28779600250077317e-02, 4.49145316536321976e-02,
    4.68135549906280105e-02, 4.85643304066731979e-02, 5.01571393058995382e-02,
    5.15832539520484565e-02, 5.28349467901165215e-02, 5.39054993352660605e-02,
    5.47892105279628658e-02, 5.54814043565593634e-02, 5.59784365104763204e-02,
    5.62776998312543020e-02, 5.63776283603847142e-02, 5.62776998312543020e-02,
    5.59784365104763204e-02, 5.54814043565593634e-02, 5.47892105279628658e-02,
    5.39054993352660605e-02, 5.28349467901165215e-02, 5.15832539520484565e-02,
    5.01571393058995382e-02, 4.85643304066731979e-02, 4.68135549906280105e-02,
    4.49145316536321976e-02, 4.28779600250077317e-02, 4.07155101169443187e-02,
    3.84398102494555305e-02, 3.60644327807825710e-02, 3.36038771482077281e-02,
    3.10735511116879658e-02, 2.84897547458335502e-02, 2.58696793272147479e-02,
    2.32314466399102700e-02, 2.05942339159127102e-02, 1.79785515681282690e-02,
    1.54067504665594979e-02, 1.29038001003512655e-02, 1.04982469096213220e-02,
    8.22300795723593034e-03, 6.11550682211724640e-03, 4.21763044155885457e-03,
    2.57904979468568827e-03, 1.26515655623006800e-03, 3.63221481845530650e-04,
];

static GP_NODES: [&[f64]; 6] = [&GP_NODES_0, &GP_NODES_1, &GP_NODES_2, &GP_NODES_3, &GP_NODES_4, &GP_NODES_5];
static GP_WEIGHTS: [&[f64]; 6] = [&GP_WEIGHTS_0, &GP_WEIGHTS_1, &GP_WEIGHTS_2, &GP_WEIGHTS_3, &GP_WEIGHTS_4, &GP_WEIGHTS_5];

/// Abscissas of the level `level` rule in ascending order.
pub fn gp_nodes(level: u32) -> Vec<f64>
{
    GP_NODES[level as usize].to_vec()
}

/// Weights of the level `level` rule, aligned with [`gp_nodes`].
pub fn gp_weights(level: u32) -> Vec<f64>
{
    GP_WEIGHTS[level as usize].to_vec()
}

#[test]
fn gp_weights_sum_to_two()
{
    for level in 0..=GP_MAX_LEVEL
    {
        let total: f64 = gp_weights(level).iter().sum();
        assert!((total - 2.0).abs() < 1e-14, "level {level}: sum={total}");
    }
}

#[test]
fn gp_levels_are_nested()
{
    for level in 0..GP_MAX_LEVEL
    {
        let coarse = gp_nodes(level);
        let fine = gp_nodes(level + 1);
        for x in coarse
        {
            assert!(fine.iter().any(|&y| y == x));
        }
    }
}

#[test]
fn gp_integrates_polynomials_exactly()
{
    // level 2 (7 nodes) integrates degree 11 exactly
    let nodes = gp_nodes(2);
    let weights = gp_weights(2);
    for degree in [0usize, 2, 4, 6, 8, 10]
    {
        let q: f64 = nodes.iter().zip(&weights).map(|(&x, &w)| w * x.powi(degree as i32)).sum();
        let exact = 2.0 / (degree as f64 + 1.0);
        assert!((q - exact).abs() < 1e-13, "degree {degree}: q={q} exact={exact}");
    }
}
