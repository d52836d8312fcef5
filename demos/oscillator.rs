use std::f64::consts::PI;

use equilibria::algorithm::{Algorithm, Linear, NewtonRaphson};
use equilibria::convergence::{ConvergenceTest, NormKind};
use equilibria::element::{Spring, ZeroLength};
use equilibria::handler::PlainHandler;
use equilibria::integrator::{CentralDifference, Integrator, Newmark};
use equilibria::material::Elastic;
use equilibria::numberer::PlainNumberer;
use equilibria::system::{Diagonal, FullGeneral, LinearSolver};
use equilibria::{AnalysisBuilder, Domain, Node, Rayleigh};

/// Unit mass on a spring tuned to one cycle per second, 2% damped.
fn oscillator() -> Result<Domain, Box<dyn std::error::Error>> {
    let omega = 2.0 * PI;
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, &[0.0, 0.0], 2)?.with_fixity(&[true, true])?)?;
    let mut mass = Node::new(2, &[0.0, 0.0], 2)?
        .with_fixity(&[false, true])?
        .with_mass(&[1.0, 0.0])?;
    mass.set_initial_displacement(&[0.05, 0.0])?;
    domain.add_node(mass)?;
    let spring = Spring::new(0, Box::new(Elastic::new(1, omega * omega)?));
    domain.add_element(Box::new(ZeroLength::new(1, [1, 2], vec![spring])))?;
    domain.set_damping(Rayleigh {
        mass: 2.0 * 0.02 * omega,
        stiffness: 0.0,
    });
    Ok(domain)
}

fn run(
    label: &str,
    system: Box<dyn LinearSolver>,
    integrator: Box<dyn Integrator>,
    algorithm: Box<dyn Algorithm>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut domain = oscillator()?;
    let mut analysis = AnalysisBuilder::new()
        .numberer(Box::new(PlainNumberer))
        .handler(Box::new(PlainHandler))
        .system(system)
        .integrator(integrator)
        .algorithm(algorithm)
        .test(ConvergenceTest::new(NormKind::EnergyIncr, 1.0e-16, 10))
        .build()?;

    println!("{label}");
    for _ in 0..8 {
        analysis.analyze(&mut domain, 25, 0.01)?;
        let node = domain.node(2).ok_or("node 2 missing")?;
        let u = node.committed_displacement(&[0])?[0];
        let v = node.committed_velocity(&[0])?[0];
        println!("  t = {:.2} s  u = {:+.5} m  v = {:+.5} m/s", domain.committed_time(), u, v);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    run(
        "Newmark, average acceleration",
        Box::new(FullGeneral::default()),
        Box::new(Newmark::average_acceleration()),
        Box::new(NewtonRaphson),
    )?;
    run(
        "Central difference",
        Box::new(Diagonal::default()),
        Box::new(CentralDifference::new()),
        Box::new(Linear),
    )
}
