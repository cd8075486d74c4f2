use crate::command::{Command, CommandQueue};
use crate::config::SimulationConfig;
use crate::control::{Statistics, VehicleControl};
use crate::error::{CommandError, Error, LoadError, Result};
use crate::light::{LogicKind, SignalMeasures};
use crate::loader::{RouteDefinition, RouteItem, RouteLoaderControl, RouteSource, RouteSpec, VehicleDefinition};
use crate::movement::{move_vehicles, MoveParams};
use crate::network::Network;
use crate::output::{OutputSink, StepOutput, VehicleRecord};
use crate::query::{JunctionInfo, LaneInfo, TrafficLightInfo, VehicleInfo};
use crate::route::{shortest_path, Route, RouteRegistry};
use crate::transfer::VehicleTransfer;
use crate::vehicle::{Vehicle, VehicleState, VehicleType};
use crate::{EdgeId, LinkId, TrafficLightId, VehicleId};
use log::{debug, info, warn};
use std::rc::Rc;

/// Times this close together count as equal.
const TIME_EPS: f64 = 1e-9;

/// Travel times are computed with at least this speed.
const MIN_ROUTING_SPEED: f64 = 0.1; // m/s

/// Whether the simulation can go on, and why not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Running,
    /// The stop time was reached.
    EndReached,
    /// No vehicle is on the road and none will be loaded.
    NoFurtherVehicles,
    /// More vehicles are running than the configured maximum.
    TooManyVehicles,
    /// The simulation was closed by command.
    Closed,
}

/// A traffic simulation.
pub struct Simulation {
    config: SimulationConfig,
    /// The road network.
    net: Network,
    /// The vehicles.
    control: VehicleControl,
    /// The vehicles currently teleporting.
    transfer: VehicleTransfer,
    routes: RouteRegistry,
    loader: RouteLoaderControl,
    /// Commands to execute at a later time.
    commands: CommandQueue,
    outputs: Vec<Box<dyn OutputSink>>,
    /// The number of steps simulated.
    frame: usize,
    closed: bool,
}

impl Simulation {
    /// Creates a simulation of the given network.
    pub fn new(net: Network, config: SimulationConfig) -> Result<Self> {
        if !(config.step_length > 0.0) || !config.step_length.is_finite() {
            return Err(Error::Config("step_length must be positive"));
        }
        if !config.begin.is_finite() {
            return Err(Error::Config("begin must be finite"));
        }
        if !(0.0..=1.0).contains(&config.routing.probability) {
            return Err(Error::Config("routing probability must lie in [0, 1]"));
        }
        if config.routing.period.map_or(false, |p| !(p > 0.0)) {
            return Err(Error::Config("routing period must be positive"));
        }
        let mut sim = Self {
            control: VehicleControl::new(config.seed, config.routing.clone()),
            transfer: VehicleTransfer::default(),
            routes: RouteRegistry::default(),
            loader: RouteLoaderControl::new(config.route_steps),
            commands: CommandQueue::default(),
            outputs: vec![],
            frame: 0,
            closed: false,
            net,
            config,
        };
        sim.apply_signal_states();
        Ok(sim)
    }

    /// Registers a vehicle type. The default type may be redefined once,
    /// before it is used.
    pub fn add_vehicle_type(&mut self, vtype: VehicleType) -> Result<()> {
        self.control.add_vehicle_type(vtype)?;
        Ok(())
    }

    /// Adds a named route which vehicles can refer to.
    pub fn add_route(&mut self, def: &RouteDefinition) -> Result<()> {
        let edges = self.edge_ids(&def.edges)?;
        if edges.is_empty() {
            return Err(LoadError::EmptyRoute(def.id.clone()).into());
        }
        self.check_connected(&edges)?;
        self.routes.add_named(&def.id, edges)?;
        Ok(())
    }

    /// Adds a vehicle, to be inserted at its departure time.
    pub fn add_vehicle(&mut self, def: &VehicleDefinition) -> Result<VehicleId> {
        let route = self.resolve_route(&def.route, &def.id)?;
        let id = self.control.build_vehicle(&self.net, def, route)?;
        Ok(id)
    }

    /// Adds a stream of route records. Without a look-ahead configured the
    /// whole stream is read immediately, so malformed records are reported here.
    pub fn add_route_source(&mut self, source: impl RouteSource + 'static) -> Result<()> {
        self.loader.add(Box::new(source));
        self.load_routes(self.time())
    }

    /// Adds a consumer of the per-step output.
    pub fn add_output(&mut self, sink: impl OutputSink + 'static) {
        self.outputs.push(Box::new(sink));
    }

    /// Schedules a command for execution at the end of the step that starts
    /// at or after `time`.
    pub fn schedule(&mut self, time: f64, command: Command) {
        self.commands.push(time, command);
    }

    /// Halts the simulation; no further steps will be run by [Self::run].
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Advances the simulation by one step.
    pub fn step(&mut self) -> Result<()> {
        let now = self.time();
        let dt = self.config.step_length;
        if self.frame == 0 {
            info!("simulation starts at t={} with step length {}", now, dt);
        } else {
            self.advance_lights(dt);
        }
        self.apply_signal_states();

        let params = MoveParams {
            time: now,
            dt,
            time_to_teleport: self.config.time_to_teleport,
            check_collisions: self.config.check_collisions,
        };
        let events = move_vehicles(&mut self.net, &mut self.control.vehicles, &params);
        for id in events.arrived {
            self.control.arrive(id, now);
        }
        for id in events.collisions {
            self.control.stats_mut().collisions += 1;
            self.teleport(id, now, "collision");
        }
        for id in events.stuck {
            self.teleport(id, now, "waited too long");
        }
        for id in self
            .transfer
            .check_insertions(&mut self.net, &mut self.control.vehicles, now, dt)
        {
            self.control.arrive(id, now);
        }

        self.load_routes(now)?;
        self.control.emit(&mut self.net, now, dt, self.config.max_depart_delay);

        if let Some(period) = self.config.routing.period {
            self.reroute_devices(now, period);
        }
        for command in self.commands.take_due(now) {
            if let Err(err) = self.execute(command) {
                warn!("scheduled command failed at t={}: {}", now, err);
            }
        }

        self.frame += 1;
        self.write_outputs()?;
        self.routes.prune();
        Ok(())
    }

    /// Runs the simulation until it stops. Returns why it stopped.
    pub fn run(&mut self) -> Result<SimulationState> {
        loop {
            let state = self.simulation_state(None);
            if state != SimulationState::Running {
                self.finish(state)?;
                return Ok(state);
            }
            self.step()?;
        }
    }

    /// Whether the simulation can go on. `stop` overrides the configured end time.
    pub fn simulation_state(&self, stop: Option<f64>) -> SimulationState {
        if self.closed {
            return SimulationState::Closed;
        }
        if let Some(end) = stop.or(self.config.end) {
            if self.time() >= end - TIME_EPS {
                return SimulationState::EndReached;
            }
        }
        let stats = self.control.stats();
        if let Some(max) = self.config.max_vehicles {
            if stats.running > max {
                return SimulationState::TooManyVehicles;
            }
        }
        if stats.running == 0 && self.control.pending_len() == 0 && !self.loader.has_more() {
            return SimulationState::NoFurtherVehicles;
        }
        SimulationState::Running
    }

    /// Applies a command immediately. A rejected command leaves the
    /// simulation unchanged.
    pub fn execute(&mut self, command: Command) -> std::result::Result<(), CommandError> {
        let now = self.time();
        match command {
            Command::Reroute { vehicle, edges } => {
                let id = self.vehicle_or_err(&vehicle)?;
                let edges = edges
                    .iter()
                    .map(|name| self.net.edge_id(name).ok_or_else(|| CommandError::UnknownEdge(name.clone())))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                self.reroute(id, edges, now)
            }
            Command::ChangeTarget { vehicle, edge } => {
                let id = self.vehicle_or_err(&vehicle)?;
                let target = self.net.edge_id(&edge).ok_or(CommandError::UnknownEdge(edge))?;
                let from = self.control.vehicles[id].current_edge();
                let edges = self.fastest_path(from, target).ok_or_else(|| CommandError::Unreachable {
                    from: self.net.edge(from).name().to_string(),
                    to: self.net.edge(target).name().to_string(),
                })?;
                self.reroute(id, edges, now)
            }
            Command::SetPhase { light, phase } => {
                let id = self.light_or_err(&light)?;
                self.net.light_mut(id).set_phase(phase)
            }
            Command::SetPhaseDuration { light, duration } => {
                let id = self.light_or_err(&light)?;
                self.net.light_mut(id).set_phase_duration(duration)
            }
            Command::InsertVehicle(def) => {
                let id = def.id.clone();
                self.add_vehicle(&def)
                    .map(|_| ())
                    .map_err(|err| CommandError::Rejected(id, err.to_string()))
            }
            Command::RemoveVehicle { vehicle } => {
                let id = self.vehicle_or_err(&vehicle)?;
                self.remove_vehicle(id);
                Ok(())
            }
            Command::SetLaneSpeed { lane, speed } => {
                let id = self.net.lane_id(&lane).ok_or(CommandError::UnknownLane(lane))?;
                if !(speed > 0.0) || !speed.is_finite() {
                    return Err(CommandError::InvalidValue(speed));
                }
                self.net.set_lane_speed(id, speed);
                Ok(())
            }
            Command::Close => {
                self.close();
                Ok(())
            }
        }
    }

    /// The simulation time at the start of the next step, in s.
    pub fn time(&self) -> f64 {
        self.config.begin + self.frame as f64 * self.config.step_length
    }

    /// Gets the number of steps simulated.
    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Gets the road network.
    pub fn network(&self) -> &Network {
        &self.net
    }

    /// Gets the aggregate vehicle statistics.
    pub fn statistics(&self) -> &Statistics {
        self.control.stats()
    }

    /// The number of vehicles currently teleporting.
    pub fn teleporting(&self) -> usize {
        self.transfer.len()
    }

    /// Looks up a vehicle by name.
    pub fn vehicle_id(&self, name: &str) -> Option<VehicleId> {
        self.control.vehicle_id(name)
    }

    /// Gets a vehicle. Vehicles leave the simulation when they arrive.
    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.control.vehicles.get(id)
    }

    /// Returns an iterator over all the vehicles in the simulation,
    /// including the ones not yet departed.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.control.vehicles.values()
    }

    pub fn vehicle_info(&self, name: &str) -> Option<VehicleInfo> {
        let id = self.control.vehicle_id(name)?;
        Some(VehicleInfo::new(&self.net, &self.control.vehicles[id]))
    }

    pub fn lane_info(&self, name: &str) -> Option<LaneInfo> {
        let id = self.net.lane_id(name)?;
        Some(LaneInfo::new(&self.net, &self.control.vehicles, self.net.lane(id)))
    }

    pub fn junction_info(&self, name: &str) -> Option<JunctionInfo> {
        let id = self.net.junction_id(name)?;
        Some(JunctionInfo::new(&self.net, self.net.junction(id)))
    }

    pub fn traffic_light_info(&self, name: &str) -> Option<TrafficLightInfo> {
        let id = self.net.traffic_light_id(name)?;
        Some(TrafficLightInfo::new(self.net.traffic_light(id)))
    }

    /// Advances every traffic light program, feeding it the current
    /// detections and queues on its approaches.
    fn advance_lights(&mut self, dt: f64) {
        let ids: Vec<TrafficLightId> = self.net.iter_traffic_lights().map(|(id, _)| id).collect();
        for id in ids {
            let measures = self.signal_measures(id);
            if self.net.light_mut(id).step(dt, &measures) {
                let light = self.net.traffic_light(id);
                debug!(
                    "traffic light {} switched to phase {} ({})",
                    light.name(),
                    light.current_phase(),
                    light.state_string()
                );
            }
        }
    }

    fn signal_measures(&self, id: TrafficLightId) -> SignalMeasures {
        let light = self.net.traffic_light(id);
        let range = match light.kind() {
            LogicKind::Actuated { detector_range, .. } => Some(*detector_range),
            _ => None,
        };
        let vehicles = &self.control.vehicles;
        let mut measures = SignalMeasures::default();
        for links in light.controlled_links() {
            let lanes = links.iter().map(|link| self.net.lane(self.net.link(*link).from()));
            let mut detected = false;
            let mut queue = 0;
            for lane in lanes {
                if let (Some(range), Some(front)) = (range, lane.front_vehicle()) {
                    detected |= lane.length() - vehicles[front].pos() <= range;
                }
                queue = queue.max(lane.halting(vehicles));
            }
            measures.detected.push(detected);
            measures.queue.push(queue);
        }
        measures
    }

    /// Copies the signal states of every traffic light onto its links.
    fn apply_signal_states(&mut self) {
        let states: Vec<_> = self
            .net
            .iter_traffic_lights()
            .flat_map(|(_, light)| {
                light
                    .controlled_links()
                    .iter()
                    .enumerate()
                    .flat_map(move |(signal, links)| links.iter().map(move |link| (*link, light.state(signal))))
            })
            .collect();
        for (link, state) in states {
            self.net.links[link].set_state(state);
        }
    }

    /// Hands a vehicle over to the vehicle transfer.
    fn teleport(&mut self, id: VehicleId, now: f64, reason: &str) {
        self.control.stats_mut().teleports += 1;
        if self
            .transfer
            .add(&mut self.net, &mut self.control.vehicles, id, now, reason)
        {
            self.control.arrive(id, now);
        }
    }

    /// Reads due route records and adds what they define.
    fn load_routes(&mut self, now: f64) -> Result<()> {
        for item in self.loader.load_next(now)? {
            match item {
                RouteItem::VehicleType(vtype) => self.add_vehicle_type(vtype)?,
                RouteItem::Route(def) => self.add_route(&def)?,
                RouteItem::Vehicle(def) => {
                    self.add_vehicle(&def)?;
                }
            }
        }
        Ok(())
    }

    fn edge_ids(&self, names: &[String]) -> std::result::Result<Vec<EdgeId>, LoadError> {
        names
            .iter()
            .map(|name| self.net.edge_id(name).ok_or_else(|| LoadError::UnknownEdge(name.clone())))
            .collect()
    }

    fn check_connected(&self, edges: &[EdgeId]) -> std::result::Result<(), LoadError> {
        self.net.check_route(edges).map_err(|(from, to)| LoadError::Disconnected {
            from: self.net.edge(from).name().to_string(),
            to: self.net.edge(to).name().to_string(),
        })
    }

    /// Finds or creates the route a vehicle definition refers to.
    fn resolve_route(&mut self, spec: &RouteSpec, vehicle: &str) -> std::result::Result<Rc<Route>, LoadError> {
        match spec {
            RouteSpec::Edges(names) => {
                let edges = self.edge_ids(names)?;
                if edges.is_empty() {
                    return Err(LoadError::EmptyRoute(vehicle.to_string()));
                }
                self.check_connected(&edges)?;
                Ok(self.routes.intern(edges))
            }
            RouteSpec::Named(name) => self.routes.get(name).ok_or_else(|| LoadError::UnknownRoute(name.clone())),
            RouteSpec::Trip { from, to } => {
                let ids = self.edge_ids(&[from.clone(), to.clone()])?;
                let net = &self.net;
                let edges = shortest_path(net, ids[0], ids[1], |e| net.edge_length(e) / net.edge_speed_limit(e).max(MIN_ROUTING_SPEED))
                    .ok_or_else(|| LoadError::NoRoute {
                        from: from.clone(),
                        to: to.clone(),
                    })?;
                Ok(self.routes.intern(edges))
            }
        }
    }

    /// The fastest path between two edges at the current travel times.
    fn fastest_path(&self, from: EdgeId, to: EdgeId) -> Option<Vec<EdgeId>> {
        let vehicles = &self.control.vehicles;
        shortest_path(&self.net, from, to, |e| {
            self.net.edge_travel_time(e, vehicles, MIN_ROUTING_SPEED)
        })
    }

    /// Re-routes the vehicles carrying the rerouting device whose period has passed.
    fn reroute_devices(&mut self, now: f64, period: f64) {
        let due: Vec<VehicleId> = self
            .control
            .vehicles
            .values()
            .filter(|veh| {
                veh.has_rerouting()
                    && veh.state() == VehicleState::Running
                    && now - veh.last_reroute() >= period - TIME_EPS
            })
            .map(|veh| veh.id())
            .collect();

        for id in due {
            let veh = &self.control.vehicles[id];
            let remaining = &veh.route().edges()[veh.route_index()..];
            let new_edges = veh
                .route()
                .destination()
                .and_then(|dest| self.fastest_path(veh.current_edge(), dest));
            let changed = new_edges.filter(|edges| edges.as_slice() != remaining);
            self.control.vehicles[id].set_last_reroute(now);
            if let Some(edges) = changed {
                if let Err(err) = self.reroute(id, edges, now) {
                    warn!("rerouting device rejected a new route: {}", err);
                }
            }
        }
    }

    /// Replaces the remaining route of a departed vehicle. The new route must
    /// start at the current edge, and a vehicle on a lane must be able to
    /// leave it towards the new route's second edge.
    fn reroute(&mut self, id: VehicleId, edges: Vec<EdgeId>, now: f64) -> std::result::Result<(), CommandError> {
        let net = &self.net;
        let veh = &self.control.vehicles[id];
        if !matches!(veh.state(), VehicleState::Running | VehicleState::Teleporting) {
            return Err(CommandError::NotRunning(veh.name().to_string()));
        }
        if edges.first() != Some(&veh.current_edge()) {
            return Err(CommandError::RouteMismatch(veh.name().to_string()));
        }
        let unreachable = |from: EdgeId, to: EdgeId| CommandError::Unreachable {
            from: net.edge(from).name().to_string(),
            to: net.edge(to).name().to_string(),
        };
        net.check_route(&edges).map_err(|(from, to)| unreachable(from, to))?;
        if let (Some(lane), Some(next)) = (veh.lane(), edges.get(1)) {
            if !net.lane_continues(lane, *next) {
                return Err(unreachable(veh.current_edge(), *next));
            }
        }

        // Grants for links onto the new next edge stay valid.
        let next = edges.get(1).copied();
        let veh = &mut self.control.vehicles[id];
        let pending = veh.take_pending_reservations();
        let route = self.routes.intern(edges);
        veh.replace_route(route, now);
        for link in pending {
            if Some(self.net.lane(self.net.link(link).to()).edge()) == next {
                veh.add_reservation(link);
            } else {
                self.net.links[link].remove_holder(id);
            }
        }
        debug!("vehicle '{}' rerouted at t={}", veh.name(), now);
        Ok(())
    }

    /// Takes a vehicle out of the simulation, wherever it is.
    fn remove_vehicle(&mut self, id: VehicleId) {
        let veh = &mut self.control.vehicles[id];
        match veh.state() {
            VehicleState::Running => {
                if let Some(lane) = veh.lane() {
                    self.net.lanes[lane].remove_vehicle(id);
                }
                let links: Vec<LinkId> = veh.take_reservations().into_iter().collect();
                for link in links {
                    self.net.links[link].remove_holder(id);
                }
                veh.clear_location();
            }
            VehicleState::Teleporting => {
                self.transfer.remove(id);
            }
            VehicleState::Pending | VehicleState::Arrived => {}
        }
        self.control.remove(id);
    }

    fn vehicle_or_err(&self, name: &str) -> std::result::Result<VehicleId, CommandError> {
        self.control
            .vehicle_id(name)
            .ok_or_else(|| CommandError::UnknownVehicle(name.to_string()))
    }

    fn light_or_err(&self, name: &str) -> std::result::Result<TrafficLightId, CommandError> {
        self.net
            .traffic_light_id(name)
            .ok_or_else(|| CommandError::UnknownTrafficLight(name.to_string()))
    }

    /// Passes the state at the end of the step to every output.
    fn write_outputs(&mut self) -> Result<()> {
        if self.outputs.is_empty() {
            return Ok(());
        }
        let vehicles = &self.control.vehicles;
        let records = self
            .net
            .iter_lanes()
            .flat_map(move |lane| {
                lane.vehicles().iter().map(move |id| {
                    let veh = &vehicles[*id];
                    let (point, _) = lane.world_pos(veh.pos().clamp(0.0, lane.length()));
                    VehicleRecord {
                        id: veh.name().to_string(),
                        lane: lane.name().to_string(),
                        pos: veh.pos(),
                        speed: veh.speed(),
                        x: point.x,
                        y: point.y,
                    }
                })
            })
            .collect();
        let output = StepOutput {
            time: self.time(),
            vehicles: records,
            stats: self.control.stats().clone(),
        };
        for sink in &mut self.outputs {
            sink.write_step(&output)?;
        }
        Ok(())
    }

    /// Flushes the outputs and logs the end-of-run summary.
    fn finish(&mut self, state: SimulationState) -> Result<()> {
        for sink in &mut self.outputs {
            sink.finish()?;
        }
        let stats = self.control.stats();
        info!(
            "simulation ended at t={} ({:?}): loaded {}, departed {}, arrived {}, running {}, teleports {}, collisions {}, discarded {}",
            self.time(),
            state,
            stats.loaded,
            stats.departed,
            stats.arrived,
            stats.running,
            stats.teleports,
            stats.collisions,
            stats.discarded
        );
        if let Some(mean) = stats.mean_travel_time() {
            info!("mean travel time {:.2} s", mean);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::network::test::{corridor, diamond, single_lane_edge};
    use crate::vehicle::Krauss;
    use crate::CarFollowModel;

    fn exact_car() -> VehicleType {
        VehicleType {
            max_speed: 10.0,
            cf_model: CarFollowModel::Krauss(Krauss {
                sigma: 0.0,
                ..Krauss::default()
            }),
            ..VehicleType::default()
        }
    }

    fn simulation(net: Network) -> Simulation {
        let mut sim = Simulation::new(net, SimulationConfig::default()).unwrap();
        sim.add_vehicle_type(exact_car()).unwrap();
        sim
    }

    #[test]
    fn rejects_bad_config() {
        let config = SimulationConfig {
            step_length: 0.0,
            ..SimulationConfig::default()
        };
        assert!(matches!(Simulation::new(Network::new(), config), Err(Error::Config(_))));
    }

    #[test]
    fn resolves_routes() {
        let (net, [a, b, c, d]) = diamond(300.0, 100.0);
        let mut sim = simulation(net);
        let trip = RouteSpec::Trip {
            from: "a".to_string(),
            to: "d".to_string(),
        };
        let id = sim.add_vehicle(&VehicleDefinition::new("trip", 0.0, trip)).unwrap();
        assert_eq!(sim.get_vehicle(id).unwrap().route().edges(), &[a, c, d]);

        sim.add_route(&RouteDefinition {
            id: "long".to_string(),
            edges: vec!["a".to_string(), "b".to_string(), "d".to_string()],
        })
        .unwrap();
        let named = sim
            .add_vehicle(&VehicleDefinition::new("named", 0.0, RouteSpec::Named("long".to_string())))
            .unwrap();
        assert_eq!(sim.get_vehicle(named).unwrap().route().edges(), &[a, b, d]);

        let broken = VehicleDefinition::new("broken", 0.0, RouteSpec::edges(&["a", "d"]));
        assert!(matches!(sim.add_vehicle(&broken), Err(Error::Load(LoadError::Disconnected { .. }))));
        let unknown = VehicleDefinition::new("unknown", 0.0, RouteSpec::edges(&["a", "x"]));
        assert!(matches!(sim.add_vehicle(&unknown), Err(Error::Load(LoadError::UnknownEdge(_)))));
        let back = RouteSpec::Trip {
            from: "d".to_string(),
            to: "a".to_string(),
        };
        assert!(matches!(
            sim.add_vehicle(&VehicleDefinition::new("back", 0.0, back)),
            Err(Error::Load(LoadError::NoRoute { .. }))
        ));
    }

    #[test]
    fn drives_to_destination() {
        let (net, _) = corridor(&[100.0, 100.0], 10.0);
        let mut sim = simulation(net);
        sim.add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["e0", "e1"])))
            .unwrap();
        assert_eq!(sim.simulation_state(None), SimulationState::Running);
        let state = sim.run().unwrap();
        assert_eq!(state, SimulationState::NoFurtherVehicles);
        let stats = sim.statistics();
        assert_eq!((stats.departed, stats.arrived, stats.running), (1, 1, 0));
        // 195 m at no more than 10 m/s
        assert!(stats.mean_travel_time().unwrap() >= 19.5);
        assert!(sim.vehicle_id("v").is_none());
    }

    #[test]
    fn commands_validate() {
        let (net, _) = corridor(&[100.0, 100.0, 100.0], 10.0);
        let mut sim = simulation(net);
        sim.add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["e0", "e1"])))
            .unwrap();
        let reroute = |edges: &[&str]| Command::Reroute {
            vehicle: "v".to_string(),
            edges: edges.iter().map(|e| e.to_string()).collect(),
        };
        assert_eq!(sim.execute(reroute(&["e0", "e1", "e2"])), Err(CommandError::NotRunning("v".to_string())));

        sim.step().unwrap();
        assert_eq!(sim.execute(reroute(&["e1", "e2"])), Err(CommandError::RouteMismatch("v".to_string())));
        assert!(matches!(sim.execute(reroute(&["e0", "e2"])), Err(CommandError::Unreachable { .. })));
        assert_eq!(sim.execute(reroute(&["e0", "e1", "e2"])), Ok(()));
        let info = sim.vehicle_info("v").unwrap();
        assert_eq!(info.route, vec!["e0", "e1", "e2"]);

        assert_eq!(
            sim.execute(Command::SetLaneSpeed {
                lane: "e1_0".to_string(),
                speed: -1.0
            }),
            Err(CommandError::InvalidValue(-1.0))
        );
        assert_eq!(
            sim.execute(Command::SetPhase {
                light: "tl".to_string(),
                phase: 0
            }),
            Err(CommandError::UnknownTrafficLight("tl".to_string()))
        );
        assert_eq!(
            sim.execute(Command::RemoveVehicle {
                vehicle: "v".to_string()
            }),
            Ok(())
        );
        assert_eq!(sim.statistics().removed, 1);
        assert!(sim.lane_info("e0_0").unwrap().vehicles.is_empty());
    }

    #[test]
    fn rerouting_device_takes_faster_branch() {
        let (net, [a, _, c, d]) = diamond(300.0, 100.0);
        let config = SimulationConfig {
            routing: RoutingConfig {
                period: Some(5.0),
                probability: 1.0,
            },
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(net, config).unwrap();
        sim.add_vehicle_type(exact_car()).unwrap();
        let id = sim
            .add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["a", "b", "d"])))
            .unwrap();
        assert!(sim.get_vehicle(id).unwrap().has_rerouting());

        for _ in 0..5 {
            sim.step().unwrap();
        }
        assert_eq!(sim.vehicle_info("v").unwrap().route, vec!["a", "b", "d"]);
        sim.step().unwrap();
        let veh = sim.get_vehicle(id).unwrap();
        assert_eq!(veh.route().edges(), &[a, c, d]);
        assert_eq!(veh.current_edge(), a);

        assert_eq!(sim.run().unwrap(), SimulationState::NoFurtherVehicles);
        assert_eq!(sim.statistics().arrived, 1);
    }

    #[test]
    fn change_target() {
        let (mut net, [a, _, c, d]) = diamond(300.0, 100.0);
        single_lane_edge(&mut net, "island", 50.0, 10.0);
        let mut sim = simulation(net);
        sim.add_vehicle(&VehicleDefinition::new("v", 0.0, RouteSpec::edges(&["a", "b"])))
            .unwrap();
        let target = |edge: &str| Command::ChangeTarget {
            vehicle: "v".to_string(),
            edge: edge.to_string(),
        };
        sim.step().unwrap();

        let before = sim.vehicle_info("v");
        assert_eq!(
            sim.execute(target("island")),
            Err(CommandError::Unreachable {
                from: "a".to_string(),
                to: "island".to_string()
            })
        );
        assert_eq!(sim.execute(target("nowhere")), Err(CommandError::UnknownEdge("nowhere".to_string())));
        assert_eq!(sim.vehicle_info("v"), before);

        assert_eq!(sim.execute(target("d")), Ok(()));
        let id = sim.vehicle_id("v").unwrap();
        assert_eq!(sim.get_vehicle(id).unwrap().route().edges(), &[a, c, d]);
        assert_eq!(sim.run().unwrap(), SimulationState::NoFurtherVehicles);
        assert_eq!(sim.statistics().arrived, 1);
    }

    #[test]
    fn scheduled_commands() {
        let (net, _) = corridor(&[100.0], 10.0);
        let mut sim = simulation(net);
        sim.schedule(
            2.0,
            Command::SetLaneSpeed {
                lane: "e0_0".to_string(),
                speed: 5.0,
            },
        );
        sim.schedule(3.0, Command::Close);
        sim.step().unwrap();
        sim.step().unwrap();
        assert_eq!(sim.lane_info("e0_0").unwrap().speed_limit, 10.0);
        sim.step().unwrap();
        assert_eq!(sim.lane_info("e0_0").unwrap().speed_limit, 5.0);
        assert_eq!(sim.simulation_state(None), SimulationState::NoFurtherVehicles);
        sim.step().unwrap();
        assert_eq!(sim.simulation_state(None), SimulationState::Closed);
        assert_eq!(sim.time(), 4.0);
    }
}
