use crate::core::config::Config;
use crate::core::io::WebStorage;
use crate::core::state::{QuizQuestion, Story};
use crate::services::backend::{HttpBackend, StoryBackend};
use crate::services::quiz::QuizSession;
use crate::services::store::StoryStore;
use crate::services::workflow::{ActiveFlow, GenerationStage, GenerationWorkflow, StepOutcome};
use leptos::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

#[derive(Clone)]
struct Services {
    store: StoryStore,
    backend: Arc<dyn StoryBackend>,
    quiz_size: usize,
}

#[derive(Clone, PartialEq)]
enum Page {
    Create,
    Explore,
    Story(String),
}

type FlowCell = Rc<RefCell<ActiveFlow>>;

/// Status of the current generation flow as shown in the stage list.
#[derive(Clone, Copy)]
struct Progress {
    stage: RwSignal<Option<usize>>,
    failed: RwSignal<Option<(usize, String)>>,
    done: RwSignal<bool>,
    running: RwSignal<bool>,
}

impl Progress {
    fn new() -> Self {
        Self {
            stage: create_rw_signal(None),
            failed: create_rw_signal(None),
            done: create_rw_signal(false),
            running: create_rw_signal(false),
        }
    }
}

#[component]
pub fn App(config: Config) -> impl IntoView {
    let (services, set_services) = create_signal(None::<Result<Services, String>>);

    create_effect(move |_| {
        let config = config.clone();
        spawn_local(async move {
            let res = async {
                let storage = WebStorage::new().await?;
                let backend = HttpBackend::new(&config)?;
                Ok::<_, anyhow::Error>(Services {
                    store: StoryStore::new(Arc::new(storage)),
                    backend: Arc::new(backend),
                    quiz_size: config.quiz_size,
                })
            }
            .await
            .map_err(|e| e.to_string());
            set_services.set(Some(res));
        });
    });

    view! {
        <div class="app-container">
            <h1>"Learnershood"</h1>
            {move || match services.get() {
                Some(Ok(s)) => view! { <Home services=s/> }.into_view(),
                Some(Err(e)) => view! { <p>"Error loading storage: " {e}</p> }.into_view(),
                None => view! { <p>"Loading..."</p> }.into_view()
            }}
        </div>
    }
}

/// Runs stages until the flow completes or a stage fails, then parks the
/// workflow so a retry can resume it.
fn drive(
    flow: FlowCell,
    mut workflow: GenerationWorkflow,
    progress: Progress,
    set_page: WriteSignal<Page>,
    on_done: Rc<dyn Fn()>,
) {
    progress.running.set(true);
    progress.failed.set(None);

    spawn_local(async move {
        loop {
            progress.stage.set(Some(workflow.current_stage().index()));
            let outcome = if workflow.failed_stage().is_some() {
                workflow.retry_stage().await
            } else {
                workflow.step().await
            };
            match outcome {
                Ok(StepOutcome::Advanced(_)) => continue,
                Ok(StepOutcome::Completed(_)) => {
                    progress.done.set(true);
                    if let Some(story) = workflow.story() {
                        set_page.set(Page::Story(story.id.clone()));
                    }
                    on_done();
                    break;
                }
                Ok(StepOutcome::Failed(stage)) => {
                    let reason = workflow
                        .failure()
                        .map(|f| f.error.to_string())
                        .unwrap_or_default();
                    progress.failed.set(Some((stage.index(), reason)));
                    break;
                }
                Err(e) => {
                    log::error!("Generation stopped: {:#}", e);
                    break;
                }
            }
        }
        flow.borrow_mut().park(workflow);
        progress.running.set(false);
    });
}

#[component]
fn Home(services: Services) -> impl IntoView {
    let (page, set_page) = create_signal(Page::Create);
    let (recent, set_recent) = create_signal(Vec::<Story>::new());
    let (query, set_query) = create_signal(String::new());
    let progress = Progress::new();
    let flow: FlowCell = Rc::new(RefCell::new(ActiveFlow::default()));

    let refresh: Rc<dyn Fn()> = {
        let store = services.store.clone();
        Rc::new(move || {
            let store = store.clone();
            spawn_local(async move {
                set_recent.set(store.get_all().await);
            });
        })
    };
    refresh();

    let on_search = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        let services = services.clone();
        move |_| {
            let topic = query.get();
            if topic.trim().is_empty() {
                return;
            }
            let workflow =
                GenerationWorkflow::new(services.backend.clone(), services.store.clone(), &topic);
            let Some(workflow) = flow.borrow_mut().start(workflow) else {
                return;
            };
            progress.done.set(false);
            drive(flow.clone(), workflow, progress, set_page, refresh.clone());
        }
    };

    let on_retry = {
        let flow = flow.clone();
        let refresh = refresh.clone();
        move |_| {
            let Some(workflow) = flow.borrow_mut().resume() else {
                return;
            };
            drive(flow.clone(), workflow, progress, set_page, refresh.clone());
        }
    };

    let on_clear = {
        let store = services.store.clone();
        let refresh = refresh.clone();
        move |_| {
            let store = store.clone();
            let refresh = refresh.clone();
            spawn_local(async move {
                store.clear().await;
                refresh();
            });
        }
    };

    let create_view = view! {
        <div class="search">
            <input
                type="text"
                placeholder="Search for an African story"
                prop:value=query
                on:input=move |ev| set_query.set(event_target_value(&ev))
            />
            <button on:click=on_search prop:disabled=move || progress.running.get()>"Create"</button>
        </div>

        <ul class="stages">
            {GenerationStage::ALL.iter().map(|s| {
                let index = s.index();
                let title = s.title();
                view! {
                    <li class:active=move || progress.stage.get() == Some(index)>
                        {title}
                        {move || {
                            if progress.failed.get().is_some_and(|(i, _)| i == index) {
                                " ✘"
                            } else if progress.done.get()
                                || progress.stage.get().is_some_and(|current| index < current)
                            {
                                " ✔"
                            } else {
                                ""
                            }
                        }}
                    </li>
                }
            }).collect_view()}
        </ul>
        {move || progress.failed.get().map(|(_, reason)| view! {
            <p class="error">{reason}</p>
            <button on:click=on_retry.clone() prop:disabled=move || progress.running.get()>"Retry"</button>
        })}

        <h3>"Recent stories"</h3>
        {move || {
            let stories = recent.get();
            if stories.is_empty() {
                view! { <p>"No stories yet. Start exploring to create your first story!"</p> }.into_view()
            } else {
                story_cards(stories, set_page)
            }
        }}
        <button on:click=on_clear>"Clear"</button>
    };

    view! {
        <nav>
            <button on:click=move |_| set_page.set(Page::Create)>"Create"</button>
            <button on:click=move |_| set_page.set(Page::Explore)>"Explore"</button>
        </nav>
        <div style:display=move || if page.get() == Page::Create { "block" } else { "none" }>
            {create_view}
        </div>
        {move || match page.get() {
            Page::Create => ().into_view(),
            Page::Explore => view! { <Explore services=services.clone() set_page=set_page/> }.into_view(),
            Page::Story(id) => view! { <StoryView services=services.clone() id=id/> }.into_view(),
        }}
    }
}

fn story_cards(stories: Vec<Story>, set_page: WriteSignal<Page>) -> View {
    stories
        .into_iter()
        .map(|story| {
            let id = story.id.clone();
            view! {
                <div class="recent-story" on:click=move |_| set_page.set(Page::Story(id.clone()))>
                    <img src=story.thumbnail().unwrap_or_default().to_string()/>
                    <span>{story.title.clone()}</span>
                </div>
            }
        })
        .collect_view()
}

#[component]
fn Explore(services: Services, set_page: WriteSignal<Page>) -> impl IntoView {
    let backend = services.backend.clone();
    let stories = create_local_resource(
        || (),
        move |_| {
            let backend = backend.clone();
            async move {
                backend
                    .fetch_all_stories()
                    .await
                    .map(|records| records.into_iter().map(Story::from).collect::<Vec<_>>())
                    .map_err(|e| e.to_string())
            }
        },
    );

    view! {
        <h2>"Explore stories"</h2>
        {move || match stories.get() {
            None => view! { <p>"Loading stories..."</p> }.into_view(),
            Some(Err(e)) => view! { <p class="error">"Failed to load stories: " {e}</p> }.into_view(),
            Some(Ok(list)) if list.is_empty() => view! { <p>"No stories found."</p> }.into_view(),
            Some(Ok(list)) => story_cards(list, set_page),
        }}
    }
}

#[component]
fn StoryView(services: Services, id: String) -> impl IntoView {
    let backend = services.backend.clone();
    let quiz_size = services.quiz_size;
    let record = create_local_resource(
        move || id.clone(),
        move |id| {
            let backend = backend.clone();
            async move { backend.fetch_story(&id).await.map_err(|e| e.to_string()) }
        },
    );

    view! {
        {move || match record.get() {
            None => view! { <p>"Loading story..."</p> }.into_view(),
            Some(Err(e)) => view! { <p class="error">"Failed to load story: " {e}</p> }.into_view(),
            Some(Ok(record)) => {
                let quiz = record.quiz.clone();
                let story = Story::from(record);
                view! {
                    <div class="story">
                        <h2>{story.title.clone()}</h2>
                        <audio controls=true src=story.audio_url.clone()></audio>
                        {story.visual_scenes.iter().map(|url| view! { <img src=url.clone()/> }).collect_view()}
                        <p>{story.transcript.clone()}</p>
                    </div>
                    <QuizPanel questions=quiz size=quiz_size/>
                }.into_view()
            }
        }}
    }
}

#[component]
fn QuizPanel(questions: Vec<QuizQuestion>, size: usize) -> impl IntoView {
    let session = create_rw_signal(QuizSession::from_pool(&questions, size));
    let (feedback, set_feedback) = create_signal(None::<bool>);

    let on_confirm = move |_| {
        let mut result = None;
        session.update(|s| result = s.confirm());
        set_feedback.set(result);
    };
    let on_next = move |_| {
        session.update(|s| {
            s.next();
        });
        set_feedback.set(None);
    };

    view! {
        <div class="quiz">
            <h3>"Quiz"</h3>
            {move || session.with(|s| {
                if s.is_empty() {
                    return view! { <p>"This story has no quiz."</p> }.into_view();
                }
                let Some(question) = s.current().cloned() else {
                    return view! {
                        <p>"Quiz complete! You scored " {s.score()} "/" {s.len()}</p>
                    }.into_view();
                };

                let confirmed = s.is_confirmed();
                let selected = s.selected();
                let answer = question
                    .options
                    .get(question.correct_answer_index)
                    .cloned()
                    .unwrap_or_default();
                view! {
                    <p>"Question " {s.position() + 1} "/" {s.len()} ": " {question.question.clone()}</p>
                    <ul class="options">
                        {question.options.iter().enumerate().map(|(i, option)| view! {
                            <li>
                                <button
                                    class:selected={selected == Some(i)}
                                    prop:disabled=confirmed
                                    on:click=move |_| session.update(|s| s.select(i))
                                >
                                    {option.clone()}
                                </button>
                            </li>
                        }).collect_view()}
                    </ul>
                    {match feedback.get() {
                        Some(true) => view! { <p class="correct">"Correct!"</p> }.into_view(),
                        Some(false) => view! {
                            <p class="incorrect">"Incorrect. The answer was: " {answer}</p>
                        }.into_view(),
                        None => ().into_view(),
                    }}
                    <p>"Score: " {s.score()}</p>
                    {if confirmed {
                        view! { <button on:click=on_next>"Next"</button> }.into_view()
                    } else {
                        view! {
                            <button on:click=on_confirm prop:disabled=selected.is_none()>"Confirm"</button>
                        }.into_view()
                    }}
                }.into_view()
            })}
        </div>
    }
}
