#![warn(clippy::pedantic)]

use approx::assert_relative_eq;
use equilibria::algorithm::{Algorithm, KrylovNewton, Linear, NewtonRaphson};
use equilibria::containers::is_symmetric;
use equilibria::convergence::{ConvergenceTest, NormKind};
use equilibria::element::Truss;
use equilibria::handler::{ConstraintHandler, PenaltyHandler, PlainHandler};
use equilibria::integrator::{Coefficients, DisplacementControl, Integrator, LoadControl};
use equilibria::material::{Bilinear, Elastic, UniaxialMaterial};
use equilibria::numberer::PlainNumberer;
use equilibria::section::{AreaSection, Rectangular};
use equilibria::system::{FullGeneral, LinearSolver, SparseDirect};
use equilibria::{
    Analysis, AnalysisBuilder, AnalysisError, AnalysisSettings, Constraint, Domain, Node, Pattern,
    TimeSeries,
};

/// Axial stiffness `EA` of every bar of the three-bar truss.
const THREE_BAR_EA: f64 = 2.0e9 * 0.1 * 0.2;

fn analysis(
    handler: Box<dyn ConstraintHandler>,
    system: Box<dyn LinearSolver>,
    integrator: Box<dyn Integrator>,
    algorithm: Box<dyn Algorithm>,
    test: ConvergenceTest,
) -> Analysis {
    AnalysisBuilder::new()
        .numberer(Box::new(PlainNumberer))
        .handler(handler)
        .system(system)
        .integrator(integrator)
        .algorithm(algorithm)
        .test(test)
        .build()
        .expect("compatible strategies")
}

fn linear_static(increment: f64) -> Analysis {
    analysis(
        Box::new(PlainHandler),
        Box::new(FullGeneral::default()),
        Box::new(LoadControl::new(increment)),
        Box::new(Linear),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-6, 1),
    )
}

fn rectangular_bar(tag: usize, nodes: [usize; 2]) -> Box<Truss> {
    let material = Elastic::new(tag, 2.0e9).expect("positive modulus");
    let section = Rectangular::new(tag, 0.1, 0.2, Box::new(material)).expect("positive dimensions");
    Box::new(Truss::new(tag, nodes, Box::new(section)))
}

/// Three bars on spatial frame nodes: two along the axes, one diagonal.
fn three_bar_truss() -> Domain {
    let mut domain = Domain::new();
    let nodes = [
        (1, [0.0, 0.0, 0.0], [true; 6]),
        (2, [2.0, 0.0, 0.0], [false, true, true, true, true, true]),
        (3, [2.0, 0.0, 2.0], [false, true, false, true, true, true]),
    ];
    for (tag, coordinates, fixity) in nodes {
        let node = Node::new(tag, &coordinates, 6)
            .and_then(|node| node.with_fixity(&fixity))
            .expect("spatial frame node");
        domain.add_node(node).expect("unique node");
    }
    domain.add_element(rectangular_bar(1, [1, 2])).expect("bar 1");
    domain.add_element(rectangular_bar(2, [2, 3])).expect("bar 2");
    domain.add_element(rectangular_bar(3, [1, 3])).expect("bar 3");
    domain
        .add_pattern(
            Pattern::plain(1, TimeSeries::linear(1.0))
                .with_load(3, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        )
        .expect("load pattern");
    domain
}

/// Two collinear bars along x: node 1 fixed, node 2 loaded, node 3 moved by a constraint.
fn bar_chain(material: &dyn UniaxialMaterial, imposed: Option<f64>) -> Domain {
    let mut domain = Domain::new();
    domain
        .add_node(
            Node::new(1, &[0.0, 0.0], 2)
                .and_then(|node| node.with_fixity(&[true, true]))
                .expect("support"),
        )
        .expect("node 1");
    for (tag, x) in [(2, 1.0), (3, 2.0)] {
        domain
            .add_node(
                Node::new(tag, &[x, 0.0], 2)
                    .and_then(|node| node.with_fixity(&[false, true]))
                    .expect("roller"),
            )
            .expect("free node");
    }
    for (tag, nodes) in [(1, [1, 2]), (2, [2, 3])] {
        let section =
            AreaSection::new(tag, 1.0, material.boxed_clone()).expect("positive area");
        domain
            .add_element(Box::new(Truss::new(tag, nodes, Box::new(section))))
            .expect("bar");
    }
    domain
        .add_pattern(Pattern::plain(1, TimeSeries::linear(1.0)).with_load(2, vec![1.0, 0.0]))
        .expect("load pattern");
    if let Some(value) = imposed {
        domain
            .add_constraint(Constraint::fix(3, 0, value))
            .expect("imposed displacement");
    }
    domain
}

/// Parallel bars between a support and a roller loaded by `load` at full load factor.
fn parallel_bars(materials: &[&dyn UniaxialMaterial], load: f64) -> Domain {
    let mut domain = Domain::new();
    domain
        .add_node(
            Node::new(1, &[0.0, 0.0], 2)
                .and_then(|node| node.with_fixity(&[true, true]))
                .expect("support"),
        )
        .expect("node 1");
    domain
        .add_node(
            Node::new(2, &[1.0, 0.0], 2)
                .and_then(|node| node.with_fixity(&[false, true]))
                .expect("roller"),
        )
        .expect("node 2");
    for (tag, material) in (1..).zip(materials) {
        let section = AreaSection::new(tag, 1.0, material.boxed_clone()).expect("positive area");
        domain
            .add_element(Box::new(Truss::new(tag, [1, 2], Box::new(section))))
            .expect("bar");
    }
    domain
        .add_pattern(Pattern::plain(1, TimeSeries::linear(1.0)).with_load(2, vec![load, 0.0]))
        .expect("load pattern");
    domain
}

fn roller_displacement(domain: &Domain) -> f64 {
    domain
        .node(2)
        .expect("node 2")
        .committed_displacement(&[0])
        .expect("dof 0")[0]
}

#[test]
fn three_bar_truss_converges_in_one_iteration_per_step() {
    let mut domain = three_bar_truss();
    let mut analysis = linear_static(0.1);

    let report = analysis
        .analyze(&mut domain, 10, 0.1)
        .expect("linear analysis succeeds");

    assert_eq!(report.steps.len(), 10);
    assert!(report.steps.iter().all(|step| step.iterations == 1));
    assert_eq!(report.total_cutbacks(), 0);
    assert_relative_eq!(domain.time(), 1.0, epsilon = 1.0e-12);

    // The horizontal bar only restrains node 2, so node 3 moves by the
    // flexibility of the vertical bar plus twice that of the diagonal.
    let vertical = THREE_BAR_EA / 2.0;
    let diagonal = THREE_BAR_EA / (2.0 * 2.0_f64.sqrt());
    let expected = 1.0 / vertical + 2.0 / diagonal;
    let node = domain.node(3).expect("node 3");
    let u = node.committed_displacement(&[0, 2]).expect("translations");
    assert!(u[0] > 0.0);
    assert_relative_eq!(u[0], expected, max_relative = 1.0e-9);
    assert_relative_eq!(u[2], -1.0 / vertical, max_relative = 1.0e-9);
}

#[test]
fn three_bar_truss_forces_and_reactions_satisfy_statics() {
    let mut domain = three_bar_truss();
    linear_static(1.0)
        .analyze(&mut domain, 1, 0.0)
        .expect("linear analysis succeeds");

    let axial = |tag| domain.element(tag).expect("bar").response().force[0];
    assert_relative_eq!(axial(1), 0.0, epsilon = 1.0e-9);
    assert_relative_eq!(axial(2), -1.0, max_relative = 1.0e-9);
    assert_relative_eq!(axial(3), 2.0_f64.sqrt(), max_relative = 1.0e-9);

    let horizontal: f64 = [1, 2]
        .iter()
        .map(|&tag| domain.node(tag).expect("support").reaction()[0])
        .sum();
    assert_relative_eq!(horizontal, -1.0, max_relative = 1.0e-9);
    assert_relative_eq!(domain.node(3).expect("node 3").reaction()[0], 0.0, epsilon = 1.0e-9);
}

#[test]
fn every_entity_commits_once_per_step() {
    let mut domain = three_bar_truss();
    linear_static(0.25)
        .analyze(&mut domain, 4, 0.0)
        .expect("linear analysis succeeds");

    assert_eq!(domain.commit_count(), 4);
    assert!(domain.nodes().all(|node| node.commit_count() == 4));
    assert!(domain.elements().all(|element| element.commit_count() == 4));
}

#[test]
fn assembled_stiffness_is_symmetric() {
    let mut domain = three_bar_truss();
    linear_static(1.0)
        .analyze(&mut domain, 1, 0.0)
        .expect("linear analysis succeeds");

    let stiffness = domain
        .assemble_matrix(Coefficients::STATIC)
        .expect("numbered domain")
        .free_dense();
    assert_eq!(stiffness.nrows(), domain.equation_count().expect("numbered"));
    assert!(is_symmetric(&stiffness, 1.0e-9));
}

#[test]
fn converged_static_state_is_in_equilibrium() {
    let material = Elastic::new(1, 100.0).expect("positive modulus");
    let mut domain = bar_chain(&material, Some(0.02));
    linear_static(1.0)
        .analyze(&mut domain, 1, 0.0)
        .expect("linear analysis succeeds");

    // K_uu u_u + K_up u_p = F_u with the imposed displacement entering through K_up.
    let stiffness = domain
        .assemble_matrix(Coefficients::STATIC)
        .expect("numbered domain");
    let displacement = domain.displacements().expect("numbered domain");
    let forces = stiffness.free_forces(&displacement);
    let loaded = domain.node(2).expect("node 2").dofs()[0]
        .equation()
        .expect("free DOF");
    assert_eq!(forces.len(), 1);
    assert_relative_eq!(forces[loaded], 1.0, max_relative = 1.0e-12);
    // Support forces balance the applied load.
    let reactions = stiffness.fixed_reactions(&displacement);
    assert_relative_eq!(reactions.sum(), -1.0, max_relative = 1.0e-12);

    let u2 = domain.node(2).expect("node 2").committed_displacement(&[0]).expect("dof 0");
    let u3 = domain.node(3).expect("node 3").committed_displacement(&[0]).expect("dof 0");
    assert_relative_eq!(u2[0], 0.015, max_relative = 1.0e-12);
    assert_relative_eq!(u3[0], 0.02, max_relative = 1.0e-12);
    assert_relative_eq!(
        domain.node(3).expect("node 3").reaction()[0],
        0.5,
        max_relative = 1.0e-9
    );
}

#[test]
fn penalty_and_elimination_agree() {
    let material = Elastic::new(1, 100.0).expect("positive modulus");
    let mut eliminated = bar_chain(&material, Some(0.02));
    let mut penalized = bar_chain(&material, Some(0.02));

    linear_static(1.0)
        .analyze(&mut eliminated, 1, 0.0)
        .expect("elimination succeeds");
    analysis(
        Box::new(PenaltyHandler::new(1.0e12)),
        Box::new(SparseDirect::default()),
        Box::new(LoadControl::new(1.0)),
        Box::new(Linear),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-6, 1),
    )
    .analyze(&mut penalized, 1, 0.0)
    .expect("penalty succeeds");

    assert_eq!(eliminated.equation_count(), Some(1));
    assert_eq!(penalized.equation_count(), Some(2));
    for tag in [2, 3] {
        let expected = eliminated.node(tag).expect("node").committed_displacement(&[0]);
        let actual = penalized.node(tag).expect("node").committed_displacement(&[0]);
        assert_relative_eq!(
            actual.expect("dof 0")[0],
            expected.expect("dof 0")[0],
            max_relative = 1.0e-8
        );
    }
}

#[test]
fn newton_raphson_follows_hardening_branch() {
    let material = Bilinear::new(1, 100.0, 1.0, 0.1).expect("valid material");
    let mut domain = parallel_bars(&[&material], 1.0);
    let mut analysis = analysis(
        Box::new(PlainHandler),
        Box::new(FullGeneral::default()),
        Box::new(LoadControl::new(0.5)),
        Box::new(NewtonRaphson),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-10, 10),
    );

    let report = analysis
        .analyze(&mut domain, 4, 0.0)
        .expect("newton iterations converge");

    // Yield at u = 0.01 under unit load, then tangent 10 up to a load of 2.
    assert_relative_eq!(roller_displacement(&domain), 0.11, max_relative = 1.0e-9);
    assert!(report.steps.iter().any(|step| step.iterations > 1));
    assert_eq!(analysis.history().len(), 4);
}

#[test]
fn krylov_newton_matches_newton_raphson() {
    let material = Bilinear::new(1, 100.0, 1.0, 0.1).expect("valid material");
    let mut domain = parallel_bars(&[&material], 1.0);
    let mut analysis = analysis(
        Box::new(PlainHandler),
        Box::new(FullGeneral::default()),
        Box::new(LoadControl::new(0.5)),
        Box::new(KrylovNewton::new(3)),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-10, 25),
    );

    analysis
        .analyze(&mut domain, 4, 0.0)
        .expect("accelerated iterations converge");

    assert_relative_eq!(roller_displacement(&domain), 0.11, max_relative = 1.0e-8);
}

#[test]
fn displacement_control_recovers_the_load_factor() {
    let material = Bilinear::new(1, 100.0, 1.0, 0.1).expect("valid material");
    let mut domain = parallel_bars(&[&material], 1.0);
    let mut analysis = analysis(
        Box::new(PlainHandler),
        Box::new(FullGeneral::default()),
        Box::new(DisplacementControl::new(2, 0, 0.01)),
        Box::new(NewtonRaphson),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-10, 10),
    );

    analysis
        .analyze(&mut domain, 11, 0.0)
        .expect("displacement control converges");

    assert_relative_eq!(roller_displacement(&domain), 0.11, max_relative = 1.0e-9);
    // Load factor equals the bar force: 1 at yield plus 10 * 0.1 of hardening.
    assert_relative_eq!(domain.committed_time(), 2.0, max_relative = 1.0e-9);
}

#[test]
fn displacement_control_rejects_a_fixed_dof() {
    let material = Elastic::new(1, 100.0).expect("positive modulus");
    let mut domain = bar_chain(&material, None);
    let mut analysis = analysis(
        Box::new(PlainHandler),
        Box::new(FullGeneral::default()),
        Box::new(DisplacementControl::new(2, 1, 0.01)),
        Box::new(NewtonRaphson),
        ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-10, 10),
    );

    let error = analysis
        .analyze(&mut domain, 1, 0.0)
        .expect_err("monitored DOF is fixed");
    assert_eq!(error, AnalysisError::MonitoredDofNotFree { node: 2, dof: 1 });
    assert_eq!(domain.commit_count(), 0);
}

#[test]
fn newton_raphson_never_reports_false_convergence() {
    let material = Bilinear::new(1, 100.0, 1.0, 0.1).expect("valid material");
    let mut domain = bar_chain(&material, None);
    let mut analysis = AnalysisBuilder::new()
        .numberer(Box::new(PlainNumberer))
        .handler(Box::new(PlainHandler))
        .system(Box::new(FullGeneral::default()))
        .integrator(Box::new(LoadControl::new(1.0)))
        .algorithm(Box::new(NewtonRaphson))
        .test(ConvergenceTest::new(NormKind::NormDispIncr, 1.0e-30, 1))
        .settings(AnalysisSettings {
            max_cutbacks: 0,
            ..AnalysisSettings::default()
        })
        .build()
        .expect("compatible strategies");

    let error = analysis
        .analyze(&mut domain, 1, 0.0)
        .expect_err("tolerance cannot be met in one iteration");
    assert!(matches!(error, AnalysisError::NotConverged { iterations: 1, .. }));
    assert_eq!(analysis.test().iteration_count(), 1);

    // The failed step left nothing behind, and reverting again changes nothing.
    assert_eq!(domain.commit_count(), 0);
    let before: Vec<Node> = domain.nodes().cloned().collect();
    assert!(before.iter().all(|node| node.trial_displacement().amax() == 0.0));
    domain.revert().expect("second revert");
    let after: Vec<Node> = domain.nodes().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn cutbacks_rescue_a_step_that_needs_smaller_increments() {
    // Yield strains 0.01 and 0.03: the full step crosses both kinks and needs
    // three Newton iterations, each half step crosses one and needs two.
    let weak = Bilinear::new(1, 100.0, 1.0, 0.1).expect("valid material");
    let strong = Bilinear::new(2, 100.0, 3.0, 0.1).expect("valid material");
    let mut domain = parallel_bars(&[&weak, &strong], 5.0);
    let mut analysis = AnalysisBuilder::new()
        .numberer(Box::new(PlainNumberer))
        .handler(Box::new(PlainHandler))
        .system(Box::new(FullGeneral::default()))
        .integrator(Box::new(LoadControl::new(1.0)))
        .algorithm(Box::new(NewtonRaphson))
        .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-10, 2))
        .settings(AnalysisSettings {
            max_cutbacks: 3,
            cutback_factor: 0.5,
            ..AnalysisSettings::default()
        })
        .build()
        .expect("compatible strategies");

    let report = analysis
        .analyze(&mut domain, 1, 0.0)
        .expect("cutbacks allow convergence");
    assert_eq!(report.total_cutbacks(), 1);
    assert_eq!(domain.commit_count(), 2);
    assert_relative_eq!(domain.committed_time(), 1.0, max_relative = 1.0e-12);
    // Both bars yielded: 1.0 + 10 * 0.06 + 3.0 + 10 * 0.04 = 5.
    assert_relative_eq!(roller_displacement(&domain), 0.07, max_relative = 1.0e-9);
}

#[test]
fn structural_changes_trigger_renumbering() {
    let material = Elastic::new(1, 100.0).expect("positive modulus");
    let mut domain = bar_chain(&material, None);
    let mut analysis = linear_static(1.0);
    analysis.analyze(&mut domain, 1, 0.0).expect("first run");
    assert_eq!(domain.equation_count(), Some(2));

    domain
        .add_constraint(Constraint::fix(3, 0, 0.0))
        .expect("new support");
    assert_eq!(domain.equation_count(), None);
    analysis.analyze(&mut domain, 1, 0.0).expect("second run");
    assert_eq!(domain.equation_count(), Some(1));
    assert_eq!(analysis.history().len(), 2);
}
