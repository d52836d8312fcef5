use equilibria::algorithm::Linear;
use equilibria::convergence::{ConvergenceTest, NormKind};
use equilibria::element::Truss;
use equilibria::handler::PlainHandler;
use equilibria::integrator::LoadControl;
use equilibria::material::Elastic;
use equilibria::numberer::PlainNumberer;
use equilibria::section::Rectangular;
use equilibria::system::FullGeneral;
use equilibria::{AnalysisBuilder, Domain, Node, Pattern, TimeSeries};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut domain = Domain::new();
    domain.add_node(Node::new(1, &[0.0, 0.0], 2)?.with_fixity(&[true, true])?)?;
    domain.add_node(Node::new(2, &[2.0, 0.0], 2)?.with_fixity(&[false, true])?)?;
    domain.add_node(Node::new(3, &[2.0, 2.0], 2)?)?;

    for (tag, nodes) in [(1, [1, 2]), (2, [2, 3]), (3, [1, 3])] {
        let steel = Elastic::new(tag, 200.0e9)?;
        let section = Rectangular::new(tag, 0.05, 0.05, Box::new(steel))?;
        domain.add_element(Box::new(Truss::new(tag, nodes, Box::new(section))))?;
    }
    domain.add_pattern(
        Pattern::plain(1, TimeSeries::linear(1.0)).with_load(3, vec![10.0e3, -5.0e3]),
    )?;

    let mut analysis = AnalysisBuilder::new()
        .numberer(Box::new(PlainNumberer))
        .handler(Box::new(PlainHandler))
        .system(Box::new(FullGeneral::default()))
        .integrator(Box::new(LoadControl::new(1.0)))
        .algorithm(Box::new(Linear))
        .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-6, 1))
        .build()?;
    analysis.analyze(&mut domain, 1, 0.0)?;

    for node in domain.nodes() {
        let u = node.committed_displacement(&[0, 1])?;
        let reaction = node.reaction();
        println!(
            "node {}: ux = {:.4e} m, uy = {:.4e} m, rx = {:.1} N, ry = {:.1} N",
            node.tag(),
            u[0],
            u[1],
            reaction[0],
            reaction[1]
        );
    }
    for element in domain.elements() {
        println!("bar {}: N = {:.1} N", element.tag(), element.response().force[0]);
    }

    Ok(())
}
