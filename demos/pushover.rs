use equilibria::algorithm::KrylovNewton;
use equilibria::convergence::{ConvergenceTest, NormKind};
use equilibria::element::Truss;
use equilibria::handler::PlainHandler;
use equilibria::integrator::DisplacementControl;
use equilibria::material::Bilinear;
use equilibria::numberer::ReverseCuthillMcKee;
use equilibria::section::AreaSection;
use equilibria::system::SparseDirect;
use equilibria::{AnalysisBuilder, AnalysisSettings, Domain, Node, Pattern, TimeSeries, Verbosity};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Two inclined bars and a vertical hanger meeting at node 4.
    let mut domain = Domain::new();
    for (tag, x) in [(1, 0.0), (2, 1.0), (3, 2.0)] {
        domain.add_node(Node::new(tag, &[x, 0.0], 2)?.with_fixity(&[true, true])?)?;
    }
    domain.add_node(Node::new(4, &[1.0, -1.0], 2)?)?;

    let bars = [(1, 1, 250.0e6), (2, 2, 350.0e6), (3, 3, 250.0e6)];
    for (tag, support, yield_stress) in bars {
        let steel = Bilinear::new(tag, 200.0e9, yield_stress, 0.02)?;
        let section = AreaSection::new(tag, 1.0e-4, Box::new(steel))?;
        domain.add_element(Box::new(Truss::new(tag, [support, 4], Box::new(section))))?;
    }
    domain.add_pattern(Pattern::plain(1, TimeSeries::linear(1.0)).with_load(4, vec![0.0, -1.0e3]))?;

    let mut analysis = AnalysisBuilder::new()
        .numberer(Box::new(ReverseCuthillMcKee))
        .handler(Box::new(PlainHandler))
        .system(Box::new(SparseDirect::default()))
        .integrator(Box::new(DisplacementControl::new(4, 1, -5.0e-4)))
        .algorithm(Box::new(KrylovNewton::default()))
        .test(ConvergenceTest::new(NormKind::NormDispIncr, 1.0e-12, 25))
        .settings(AnalysisSettings {
            verbosity: Verbosity::Step,
            ..AnalysisSettings::default()
        })
        .build()?;

    println!("{:>12} {:>12}", "uy [m]", "load [kN]");
    for _ in 0..20 {
        analysis.analyze(&mut domain, 1, 0.0)?;
        let u = domain.node(4).ok_or("node 4 missing")?.committed_displacement(&[1])?;
        println!("{:>12.4e} {:>12.2}", u[0], domain.committed_time());
    }

    Ok(())
}
